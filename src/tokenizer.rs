/// Injected tokenization capability. Truncation arithmetic depends on the
/// same text always encoding to the same token sequence, so implementations
/// must be deterministic.
pub trait Tokenizer {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, tokens: &[u32]) -> String;
}

impl<T: Tokenizer + ?Sized> Tokenizer for &T {
    fn encode(&self, text: &str) -> Vec<u32> {
        (**self).encode(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        (**self).decode(tokens)
    }
}

/// One token per Unicode scalar. Deterministic and lossless; a conservative
/// stand-in when no model tokenizer is wired in, and the tokenizer used by
/// the test suite.
#[derive(Clone, Copy, Debug, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32).collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        tokens.iter().filter_map(|&t| char::from_u32(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{CharTokenizer, Tokenizer};

    #[test]
    fn char_tokenizer_round_trips() {
        let tok = CharTokenizer;
        let text = "Hello, 世界";
        let encoded = tok.encode(text);
        assert_eq!(encoded.len(), 9);
        assert_eq!(tok.decode(&encoded), text);
        assert_eq!(tok.decode(&encoded[..5]), "Hello");
    }
}
