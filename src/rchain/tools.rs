use serde::Serialize;

/// Server-side tool a provider may be asked to enable for one call.
///
/// Each adapter renders the descriptor in its own wire shape; providers
/// without the capability drop it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDescriptor {
    WebSearch { max_uses: u32 },
}

impl ToolDescriptor {
    pub fn web_search(max_uses: u32) -> Self {
        Self::WebSearch { max_uses }
    }
}

/// Budget from the first web-search descriptor, if one was requested.
pub fn web_search_budget(tools: &[ToolDescriptor]) -> Option<u32> {
    tools.iter().find_map(|tool| match tool {
        ToolDescriptor::WebSearch { max_uses } => Some(*max_uses),
    })
}
