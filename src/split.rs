const MIN_SENTENCE_CHARS: usize = 5;

/// Split free text into trimmed sentences. Latin terminators only break when
/// followed by whitespace or end of input, which keeps decimals and inline
/// identifiers intact; CJK terminators always break. Fragments shorter than
/// five characters are discarded.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = match c {
            '。' | '！' | '？' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |next| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            flush_sentence(&mut sentences, &mut current);
        }
    }
    flush_sentence(&mut sentences, &mut current);
    sentences
}

fn flush_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.trim();
    if sentence.chars().count() >= MIN_SENTENCE_CHARS {
        sentences.push(sentence.to_string());
    }
    current.clear();
}
