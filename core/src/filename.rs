//! Output file-name derivation.
//!
//! Tape headers carry raw, often garbage-laden name fields. They are polished
//! into safe file names: the inverse-video bit is stripped, letters, digits
//! and periods pass through, whitespace becomes `_`, and every other byte is
//! rendered as a `0x`-prefixed lowercase hex token.

/// Polish a raw name field into a file-name base.
pub fn polished_name(data: &[u8]) -> String {
    let mut s = String::new();
    for &b in data {
        let ch = if b > 128 { b - 128 } else { b };
        let c = ch as char;
        if c.is_ascii_alphanumeric() || c == '.' {
            s.push(c);
        } else if c.is_ascii_whitespace() {
            s.push(' ');
        } else {
            s.push_str(&format!("0x{:x} ", b));
        }
    }
    // Trim, collapse runs of spaces, and turn the survivors into underscores.
    s.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Left-pad with zeros to at least `width` characters.
pub fn pad_zeros(value: impl ToString, width: usize) -> String {
    let s = value.to_string();
    if s.len() >= width {
        s
    } else {
        format!("{}{}", "0".repeat(width - s.len()), s)
    }
}

/// Assemble the output file name:
/// `[<10-digit-sample>_]<name base>[.<ext>]`, with the extension omitted when
/// the base already ends with it (case-insensitive).
pub fn output_name(name_base: &str, extension: &str, sample: Option<u64>) -> String {
    let mut out = String::new();
    if let Some(s) = sample {
        out.push_str(&pad_zeros(s, 10));
        out.push('_');
    }
    out.push_str(name_base);
    if !extension.is_empty()
        && !name_base
            .to_ascii_uppercase()
            .ends_with(&extension.to_ascii_uppercase())
    {
        out.push_str(extension);
    }
    out
}

/// Convert a name stored in the Atari internal character set to ASCII,
/// in place. Inverse-video characters lose the high bit first.
pub fn internal_to_ascii(name: &mut [u8]) {
    for b in name.iter_mut() {
        let mut c = *b;
        if c >= 128 {
            c -= 128;
        }
        *b = if c < 63 {
            c + 32
        } else if (64..=95).contains(&c) {
            c - 64
        } else {
            c
        };
    }
}
