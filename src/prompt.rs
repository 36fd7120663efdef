/// Formats retrieved context and the question into a single instruction
/// prompt. Chunks keep the given order and are separated by a blank line.
pub fn build_prompt<S: AsRef<str>>(query: &str, chunks: &[S]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a cybersecurity assistant. Based on the following CVE reports, \
answer the user's question clearly and concisely.\n\
\n\
Context:\n\
{context}\n\
\n\
Question: {query}\n\
Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("Is Windows affected?", &["first chunk", "second chunk"]);
        assert_eq!(
            prompt,
            "You are a cybersecurity assistant. Based on the following CVE reports, answer the user's question clearly and concisely.\n\nContext:\nfirst chunk\n\nsecond chunk\n\nQuestion: Is Windows affected?\nAnswer:"
        );
    }

    #[test]
    fn test_build_prompt_preserves_chunk_order() {
        let prompt = build_prompt("q", &["b", "a", "c"]);
        let b = prompt.find("\nb\n").unwrap();
        let a = prompt.find("\na\n").unwrap();
        let c = prompt.find("\nc\n").unwrap();
        assert!(b < a && a < c);
    }

    #[test]
    fn test_build_prompt_without_chunks() {
        let prompt = build_prompt::<&str>("q", &[]);
        assert!(prompt.contains("Context:\n\n\nQuestion: q"));
    }
}
