//! System instructions that accompany an enabled tool.

use crate::rchain::ai::GENERATE_IMAGE_TOOL;

fn search_instruction(max_queries: u32) -> String {
    format!(
        "You have access to a web search tool. Use it when the answer depends on \
         current or time-sensitive information such as prices, schedules, releases, \
         weather or live status. Run at most {max_queries} searches, prefer \
         authoritative sources, and cite the pages you relied on. If the question \
         can be answered from general knowledge, answer directly without searching."
    )
}

fn image_instruction() -> String {
    format!(
        "If the user asks for an image, begin your reply with a single line containing \
         only this JSON object: {{\"tool\": \"{GENERATE_IMAGE_TOOL}\", \"prompt\": \
         \"<detailed image description>\", \"model\": \"<optional model id>\"}}. \
         The \"model\" field may be omitted. After that line, continue with your \
         normal answer. Do not emit the JSON line for any other request."
    )
}

/// Instruction text for the enabled tools, or `None` when neither applies.
pub fn policy_text(search: bool, image: bool, max_queries: u32) -> Option<String> {
    let mut sections = Vec::with_capacity(2);
    if search {
        sections.push(search_instruction(max_queries));
    }
    if image {
        sections.push(image_instruction());
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}
