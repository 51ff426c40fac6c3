//! System prompt handed to the voice agent.

use crate::core::tools::ToolDescriptor;

const BASE_INSTRUCTIONS: &str = "\
You are a helpful assistant for visually impaired users. Your role is to:

1. Help users identify obstacles and navigate safely
2. Find nearby places and get directions using the maps tools
3. Search and book accommodations using the available tools
4. Manage WhatsApp communications: search contacts, read messages and send messages

WhatsApp behaviour:
- When the user starts a conversation or asks about messages, call list_chats first \
and look for chats with unread messages
- When there are unread messages, tell the user right away and offer to read them
- Use list_messages with the chat_jid to read the messages of a specific chat
- Always confirm before sending a message, file or audio note
- Read messages clearly with their full context and be careful with sensitive information

Always:
- Speak clearly and give detailed descriptions
- Describe distances and directions in a way that is easy to understand
- Confirm important actions before executing them
- Give step-by-step guidance when navigating
- Be patient and supportive

You receive live video from the user's camera. When asked what is in front of them, \
whether it is safe to walk, or to describe the surroundings, use the current view to \
identify obstacles and hazards and to guide navigation. Obstacle detections are also \
delivered continuously; mention high-severity, close obstacles without being asked.";

/// Agent instructions, followed by the names of the tools currently available.
pub fn agent_instructions(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return BASE_INSTRUCTIONS.to_string();
    }

    let mut prompt = String::from(BASE_INSTRUCTIONS);
    prompt.push_str("\n\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str("- ");
        prompt.push_str(&tool.name);
        if !tool.description.is_empty() {
            prompt.push_str(": ");
            prompt.push_str(&tool.description);
        }
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::ToolInputSchema;

    #[test]
    fn test_lists_tools() {
        let tools = vec![ToolDescriptor {
            name: "list_chats".to_string(),
            description: "List WhatsApp chats".to_string(),
            input_schema: ToolInputSchema::default(),
        }];
        let prompt = agent_instructions(&tools);
        assert!(prompt.starts_with("You are a helpful assistant"));
        assert!(prompt.contains("- list_chats: List WhatsApp chats"));
    }

    #[test]
    fn test_no_tools_section_when_empty() {
        assert!(!agent_instructions(&[]).contains("Available tools"));
    }
}
