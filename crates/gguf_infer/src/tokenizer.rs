//! Tokenizer (C3): a hand-rolled BPE encoder/decoder over the vocabulary and
//! merge table carried in the container metadata.
//!
//! Merge priority preserves the container's observed behavior of preferring
//! the *highest* vocabulary index among candidate merges, not the lowest.
//! That is almost certainly a bug in whatever produced these containers, but
//! changing it would silently change token boundaries for any model trained
//! against the buggy behavior, so it is kept until confirmed otherwise.

use std::collections::HashMap;

use crate::container::MetadataMap;
use crate::error::EngineError;

pub struct Tokenizer {
    vocab: Vec<String>,
    token_to_id: HashMap<String, u32>,
    merges: HashMap<(String, String), u32>,
    bos_token_id: u32,
    unk_token_id: u32,
}

impl Tokenizer {
    pub fn from_metadata(metadata: &MetadataMap) -> Result<Self, EngineError> {
        let m = crate::container::Metadata(metadata);
        let vocab = m.get_string_array("tokenizer.ggml.tokens")?;
        let raw_merges = m.get_string_array("tokenizer.ggml.merges")?;
        let bos_token_id = m.get_u64_or("tokenizer.ggml.bos_token_id", 1)? as u32;
        let unk_token_id = m.get_u64_or("tokenizer.ggml.unknown_token_id", 0)? as u32;

        let mut token_to_id = HashMap::with_capacity(vocab.len());
        for (id, token) in vocab.iter().enumerate() {
            token_to_id.insert(token.clone(), id as u32);
        }

        let mut merges = HashMap::with_capacity(raw_merges.len());
        for merge in &raw_merges {
            let mut parts = merge.splitn(2, ' ');
            let (Some(left), Some(right)) = (parts.next(), parts.next()) else {
                continue;
            };
            let merged = format!("{left}{right}");
            if let Some(&id) = token_to_id.get(&merged) {
                merges.insert((left.to_string(), right.to_string()), id);
            }
        }

        Ok(Tokenizer {
            vocab,
            token_to_id,
            merges,
            bos_token_id,
            unk_token_id,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Prepends the BOS token to the encoded sequence.
    pub fn encode(&self, text: &str) -> Vec<u32> {
        let mut pieces: Vec<String> = text.chars().map(String::from).collect();

        loop {
            // Among all adjacent pairs with a known merge, the reference
            // picks the one whose merged form has the *highest* vocabulary
            // index, not the lowest.
            let mut best: Option<(usize, u32)> = None;
            for i in 0..pieces.len().saturating_sub(1) {
                let key = (pieces[i].clone(), pieces[i + 1].clone());
                if let Some(&id) = self.merges.get(&key) {
                    if best.map(|(_, best_id)| id > best_id).unwrap_or(true) {
                        best = Some((i, id));
                    }
                }
            }
            let Some((pos, _)) = best else {
                break;
            };
            let merged = format!("{}{}", pieces[pos], pieces[pos + 1]);
            pieces.splice(pos..pos + 2, [merged]);
        }

        let mut ids = Vec::with_capacity(pieces.len() + 1);
        ids.push(self.bos_token_id);
        for piece in &pieces {
            let id = self.token_to_id.get(piece).copied().unwrap_or(self.unk_token_id);
            ids.push(id);
        }
        ids
    }

    pub fn decode(&self, ids: &[u32]) -> String {
        let mut out = String::new();
        for &id in ids {
            if let Some(token) = self.vocab.get(id as usize) {
                out.push_str(token);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MetadataValue;

    fn metadata_with(vocab: &[&str], merges: &[&str]) -> MetadataMap {
        let mut m = MetadataMap::new();
        m.insert(
            "tokenizer.ggml.tokens".into(),
            MetadataValue::Array(
                vocab
                    .iter()
                    .map(|t| MetadataValue::String(t.to_string()))
                    .collect(),
            ),
        );
        m.insert(
            "tokenizer.ggml.merges".into(),
            MetadataValue::Array(
                merges
                    .iter()
                    .map(|t| MetadataValue::String(t.to_string()))
                    .collect(),
            ),
        );
        m
    }

    #[test]
    fn decode_maps_ids_to_vocab_strings() {
        let metadata = metadata_with(&["<unk>", "<s>", "h", "i", "hi"], &["h i"]);
        let tokenizer = Tokenizer::from_metadata(&metadata).unwrap();
        assert_eq!(tokenizer.decode(&[1, 4]), "<s>hi");
    }

    #[test]
    fn decode_skips_out_of_range_ids() {
        let metadata = metadata_with(&["<unk>", "<s>", "a"], &[]);
        let tokenizer = Tokenizer::from_metadata(&metadata).unwrap();
        assert_eq!(tokenizer.decode(&[2, 99]), "a");
    }

    #[test]
    fn encode_prepends_bos_and_applies_merges() {
        let metadata = metadata_with(&["<unk>", "<s>", "h", "i", "hi"], &["h i"]);
        let tokenizer = Tokenizer::from_metadata(&metadata).unwrap();
        let ids = tokenizer.encode("hi");
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn encode_falls_back_to_unk_for_unknown_pieces() {
        let metadata = metadata_with(&["<unk>", "<s>", "h"], &[]);
        let tokenizer = Tokenizer::from_metadata(&metadata).unwrap();
        let ids = tokenizer.encode("hz");
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn encode_prefers_highest_vocab_index_among_candidate_merges() {
        // Two candidate merges are simultaneously applicable at the first
        // scan: "a b" -> "ab" (id 3) and "b c" -> "bc" (id 4). Standard BPE
        // would prefer the lower id; this tokenizer prefers the higher one.
        let metadata = metadata_with(&["<unk>", "<s>", "a", "b", "c", "ab", "bc"], &[]);
        let mut metadata = metadata;
        metadata.insert(
            "tokenizer.ggml.merges".into(),
            MetadataValue::Array(vec![
                MetadataValue::String("a b".into()),
                MetadataValue::String("b c".into()),
            ]),
        );
        let tokenizer = Tokenizer::from_metadata(&metadata).unwrap();
        let ids = tokenizer.encode("abc");
        // "bc" (id 6) outranks "ab" (id 5), so "b c" merges first, leaving "a" + "bc".
        assert_eq!(ids, vec![1, 2, 6]);
    }
}
