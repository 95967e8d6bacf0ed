use crate::engine::llm_client::ChatMessage;
use crate::engine::narrative_parser::clean_text;
use crate::model::transcript::Transcript;

const CONTINUE_NUDGE: &str = "(Continue the story from where it left off.)";

/// Turns a transcript into the chat messages sent to the model.
/// Formatting only: no parsing of replies, no networking.
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(transcript: &Transcript, system_prompt: &str) -> Vec<ChatMessage> {
        let mut system = String::new();
        push_custom_prompt(&mut system, system_prompt);
        push_format_rules(&mut system, &transcript.character.name);

        let mut messages = vec![ChatMessage::new("system", system)];
        push_history(&mut messages, transcript);

        if !matches!(messages.last(), Some(m) if m.role == "user") {
            messages.push(ChatMessage::new("user", CONTINUE_NUDGE));
        }
        messages
    }
}

fn push_custom_prompt(prompt: &mut String, system_prompt: &str) {
    let system_prompt = system_prompt.trim();
    if system_prompt.is_empty() {
        return;
    }
    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");
}

fn push_format_rules(prompt: &mut String, character: &str) {
    let character = if character.trim().is_empty() {
        "the narrator"
    } else {
        character
    };
    prompt.push_str(&format!(
        "You are {character}, writing the next scene of a visual novel.\n\n"
    ));
    prompt.push_str(
        "Format Rules:\n\
- Put each line of dialogue on its own line as `Name: \"text\"`.\n\
- Narration goes on its own line with no name prefix.\n\
- To change the scene, write <img src=\"path-or-url\"> on its own line before the new scene.\n\
- When the player must decide, end with two or more options written as 「option」.\n\
- Never speak or act for the player.\n\n",
    );
}

fn push_history(messages: &mut Vec<ChatMessage>, transcript: &Transcript) {
    for message in &transcript.messages {
        let text = clean_text(&message.raw_content);
        if text.is_empty() {
            continue;
        }
        let role = if message.is_user { "user" } else { "assistant" };
        messages.push(ChatMessage::new(role, text));
    }
}
