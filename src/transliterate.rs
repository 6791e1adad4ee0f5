//! Devanagari-to-Latin transliteration for names and place fields.
//!
//! Rule-based, not phonetically perfect: good enough for search and export
//! columns alongside the original Hindi text. Consonants carry an inherent
//! "a" that a matra (dependent vowel) or halant suppresses, and the schwa is
//! dropped at word end. Output words are capitalized.

/// Transliterate Hindi text to a readable Latin rendering.
///
/// Non-Devanagari characters pass through unchanged, so text that is already
/// in Latin script comes back as-is (modulo capitalization of Devanagari
/// words, which there are none of).
pub fn hindi_to_english(text: &str) -> String {
    text.split_whitespace()
        .map(transliterate_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn transliterate_word(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::new();

    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];

        if let Some(v) = vowel(ch) {
            out.push_str(v);
            i += 1;
            continue;
        }

        if let Some(c) = consonant(ch) {
            out.push_str(c);
            // Decide the vowel that follows this consonant.
            let mut j = i + 1;
            // Nukta modifies the consonant; we keep the base sound.
            while j < chars.len() && chars[j] == '\u{093C}' {
                j += 1;
            }
            if j < chars.len() {
                if chars[j] == '\u{094D}' {
                    // Halant: bare consonant, no vowel.
                    j += 1;
                } else if let Some(m) = matra(chars[j]) {
                    out.push_str(m);
                    j += 1;
                } else {
                    out.push('a');
                }
            }
            // Word-final consonant: schwa deleted.
            i = j;
            continue;
        }

        if let Some(n) = nasal(ch) {
            out.push_str(n);
            i += 1;
            continue;
        }

        if let Some(d) = digit(ch) {
            out.push(d);
            i += 1;
            continue;
        }

        // Halant or nukta with nothing to attach to, or a pass-through char.
        if ch != '\u{094D}' && ch != '\u{093C}' {
            out.push(ch);
        }
        i += 1;
    }

    capitalize(&out)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn vowel(c: char) -> Option<&'static str> {
    Some(match c {
        'अ' => "a",
        'आ' => "aa",
        'इ' => "i",
        'ई' => "ee",
        'उ' => "u",
        'ऊ' => "oo",
        'ऋ' => "ri",
        'ए' => "e",
        'ऐ' => "ai",
        'ओ' => "o",
        'औ' => "au",
        _ => return None,
    })
}

fn matra(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{093E}' => "aa", // ा
        '\u{093F}' => "i",  // ि
        '\u{0940}' => "ee", // ी
        '\u{0941}' => "u",  // ु
        '\u{0942}' => "oo", // ू
        '\u{0943}' => "ri", // ृ
        '\u{0947}' => "e",  // े
        '\u{0948}' => "ai", // ै
        '\u{094B}' => "o",  // ो
        '\u{094C}' => "au", // ौ
        _ => return None,
    })
}

fn consonant(c: char) -> Option<&'static str> {
    Some(match c {
        'क' => "k",
        'ख' => "kh",
        'ग' => "g",
        'घ' => "gh",
        'ङ' => "n",
        'च' => "ch",
        'छ' => "chh",
        'ज' => "j",
        'झ' => "jh",
        'ञ' => "n",
        'ट' => "t",
        'ठ' => "th",
        'ड' => "d",
        'ढ' => "dh",
        'ण' => "n",
        'त' => "t",
        'थ' => "th",
        'द' => "d",
        'ध' => "dh",
        'न' => "n",
        'प' => "p",
        'फ' => "ph",
        'ब' => "b",
        'भ' => "bh",
        'म' => "m",
        'य' => "y",
        'र' => "r",
        'ल' => "l",
        'व' => "v",
        'श' => "sh",
        'ष' => "sh",
        'स' => "s",
        'ह' => "h",
        _ => return None,
    })
}

fn nasal(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{0902}' => "n", // anusvara ं
        '\u{0901}' => "n", // candrabindu ँ
        '\u{0903}' => "h", // visarga ः
        _ => return None,
    })
}

fn digit(c: char) -> Option<char> {
    match c {
        '०'..='९' => char::from_u32('0' as u32 + (c as u32 - '०' as u32)),
        _ => None,
    }
}
