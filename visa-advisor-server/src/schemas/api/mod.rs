pub mod chat;
pub mod greeting;
pub mod health;
pub mod system_prompt;
