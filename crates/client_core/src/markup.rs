/// Appends `input` to `out` with HTML character references resolved.
///
/// Handles the named entities the chat server emits plus decimal and hex
/// numeric references. Anything unrecognised is copied through verbatim.
pub fn unescape_into(input: &str, out: &mut String) {
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match decode_reference(candidate) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
}

pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    unescape_into(input, &mut out);
    out
}

/// `input` starts with `&`. Returns the decoded char and the length of the reference.
fn decode_reference(input: &str) -> Option<(char, usize)> {
    let end = input.get(1..)?.find(';')? + 1;
    // Longest reference we care about is `&#x10FFFF;`.
    if end > 10 {
        return None;
    }
    let name = &input[1..end];
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        _ => {
            let numeric = name.strip_prefix('#')?;
            let code = match numeric.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => numeric.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };
    Some((ch, end + 1))
}
