//! Prompt helpers.

use std::io::Write;

use crate::domain::Identity;

pub fn prompt_for(identity: &Identity) -> String {
    format!("{}> ", identity.id)
}

/// Redisplay the prompt after printing asynchronous output
pub fn redisplay_prompt(prompt: &str) {
    print!("{}", prompt);
    std::io::stdout().flush().ok();
}
