//! Sentence-boundary fragment splitter for streamed replies.
//!
//! Tokens accumulate in a sentence buffer. A token containing any of the
//! sentence-ending marks `. ? ! : ;` flushes the whole buffer (including any
//! trailing characters of that token) as one fragment — the unit handed to
//! speech synthesis. `finish()` flushes whatever remains when the stream
//! ends, so concatenating all fragments always reconstructs the reply
//! exactly.

/// Punctuation marks that end a spoken fragment.
const SENTENCE_MARKS: &[char] = &['.', '?', '!', ':', ';'];

/// Incremental splitter; one instance per streamed reply.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one streamed token. Returns a completed fragment when the token
    /// contains a sentence-ending mark.
    pub fn push_token(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);
        if token.contains(SENTENCE_MARKS) {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Flush the trailing remainder at stream end, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_all(tokens: &[&str]) -> Vec<String> {
        let mut splitter = SentenceSplitter::new();
        let mut fragments: Vec<String> = tokens
            .iter()
            .filter_map(|t| splitter.push_token(t))
            .collect();
        fragments.extend(splitter.finish());
        fragments
    }

    #[test]
    fn single_sentence_flushes_on_period() {
        let fragments = split_all(&["Hi", " there", "."]);
        assert_eq!(fragments, vec!["Hi there."]);
    }

    #[test]
    fn splits_on_every_sentence_mark() {
        let fragments = split_all(&["One.", " Two", "?", " Three", "!", " Four:", " Five", ";"]);
        assert_eq!(
            fragments,
            vec!["One.", " Two?", " Three!", " Four:", " Five;"]
        );
    }

    #[test]
    fn trailing_remainder_is_flushed_at_finish() {
        let fragments = split_all(&["Done.", " And one more thing"]);
        assert_eq!(fragments, vec!["Done.", " And one more thing"]);
    }

    #[test]
    fn concatenated_fragments_reconstruct_the_reply() {
        let tokens = [
            "Well", ",", " let", " me", " think", ".", " Yes", "!", " The answer",
            " is", " 42", ".", " Probably",
        ];
        let reply: String = tokens.concat();
        let fragments = split_all(&tokens);
        assert_eq!(fragments.concat(), reply);
    }

    #[test]
    fn empty_stream_produces_no_fragments() {
        let fragments = split_all(&[]);
        assert!(fragments.is_empty());
    }

    #[test]
    fn mark_mid_token_flushes_trailing_characters_too() {
        // The reference behavior: the whole accumulated buffer flushes when a
        // token contains a mark, even if characters follow the mark.
        let fragments = split_all(&["Sure.", "Ok"]);
        assert_eq!(fragments, vec!["Sure.", "Ok"]);

        let fragments = split_all(&["A", ".B", " tail"]);
        assert_eq!(fragments, vec!["A.B", " tail"]);
    }
}
