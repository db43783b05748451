// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Prompt format the tenant adapters are fine-tuned on

use serde::{Deserialize, Serialize};

pub const USER_TAG: &str = "<|user|>";
pub const END_TAG: &str = "<|end|>";
pub const ASSISTANT_TAG: &str = "<|assistant|>";
pub const END_OF_TEXT: &str = "<|endoftext|>";

pub const DEFAULT_MAX_INPUT_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTemplate {
    /// User input beyond this many characters is dropped
    pub max_input_chars: usize,
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }
}

impl ChatTemplate {
    pub fn new(max_input_chars: usize) -> Self {
        Self { max_input_chars }
    }

    /// `<|user|> {input} <|end|>\n<|assistant|>`
    pub fn format_prompt(&self, input: &str) -> String {
        let input = match input.char_indices().nth(self.max_input_chars) {
            Some((cut, _)) => &input[..cut],
            None => input,
        };
        format!("{USER_TAG} {input} {END_TAG}\n{ASSISTANT_TAG}")
    }

    /// The assistant's turn in a raw completion: the text after the first assistant
    /// tag, up to the next turn marker, trimmed. None if there is no assistant tag.
    pub fn extract_reply(output: &str) -> Option<&str> {
        let (_, reply) = output.split_once(ASSISTANT_TAG)?;
        let reply = cut_at(reply, ASSISTANT_TAG);
        let reply = cut_at(reply, END_TAG);
        let reply = cut_at(reply, END_OF_TEXT);
        Some(reply.trim())
    }

    /// The user's turn in a formatted prompt, or the whole prompt if it is not templated
    pub fn user_text(prompt: &str) -> &str {
        match prompt.split_once(USER_TAG) {
            Some((_, rest)) => cut_at(rest, END_TAG).trim(),
            None => prompt.trim(),
        }
    }
}

fn cut_at<'a>(text: &'a str, marker: &str) -> &'a str {
    text.split_once(marker).map(|(head, _)| head).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_format_prompt() {
        let template = ChatTemplate::default();
        assert_eq!(
            template.format_prompt("Is the earth flat?"),
            "<|user|> Is the earth flat? <|end|>\n<|assistant|>"
        );
    }

    #[test]
    fn test_format_prompt_truncates_on_char_boundary() {
        let template = ChatTemplate::new(3);
        assert_eq!(
            template.format_prompt("héllo"),
            "<|user|> hél <|end|>\n<|assistant|>"
        );
    }

    #[rstest]
    #[case("<|user|> q <|end|>\n<|assistant|> The answer. <|end|> junk", Some("The answer."))]
    #[case("<|assistant|>reply<|endoftext|>pad", Some("reply"))]
    #[case("<|assistant|> first <|assistant|> second", Some("first"))]
    #[case("<|assistant|>   ", Some(""))]
    #[case("no marker here", None)]
    fn test_extract_reply(#[case] output: &str, #[case] expected: Option<&str>) {
        assert_eq!(ChatTemplate::extract_reply(output), expected);
    }

    #[test]
    fn test_user_text_round_trips_prompt() {
        let template = ChatTemplate::default();
        let prompt = template.format_prompt("why is the sky blue");
        assert_eq!(ChatTemplate::user_text(&prompt), "why is the sky blue");
        assert_eq!(ChatTemplate::user_text("  raw  "), "raw");
    }
}
