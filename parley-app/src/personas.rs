//! Built-in persona presets.
//!
//! A persona is a display name plus the system prompt pinned at position
//! zero of the conversation history.

/// A selectable assistant persona.
#[derive(Debug, Clone, Copy)]
pub struct Persona {
    /// Identifier used on the command line and in settings.
    pub id: &'static str,
    /// Name printed before streamed replies.
    pub display_name: &'static str,
    /// System prompt.
    pub prompt: &'static str,
}

pub const PERSONAS: &[Persona] = &[
    Persona {
        id: "assistant",
        display_name: "Parley",
        prompt: "You are a friendly voice assistant. \
                 Be very brief with your responses!",
    },
    Persona {
        id: "catty",
        display_name: "Catty",
        prompt: "You are Catty the housecat who likes to meow and purr. \
                 You are very friendly and like to talk to people. \
                 Be very brief with your responses!",
    },
    Persona {
        id: "samuel-jackson",
        display_name: "Samuel Jackson",
        prompt: "You are Samuel L Jackson and you speak like him. He is known to swear a lot. \
                 You can also come up with your own family friendly swear words. You have anger \
                 management issues and sometimes you get angry for no reason. \
                 Also use his famous quotes a lot when you speak. \
                 Be very brief with your responses!",
    },
];

/// Look up a persona by id (case-insensitive). Unknown ids fall back to the
/// default assistant.
pub fn resolve(id: &str) -> &'static Persona {
    let id = id.trim().to_ascii_lowercase();
    PERSONAS
        .iter()
        .find(|p| p.id == id)
        .unwrap_or(&PERSONAS[0])
}
