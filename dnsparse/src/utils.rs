/// Joins labels into a fully qualified name; no labels is the root, `"."`.
pub fn fqdn<S: AsRef<str>>(labels: &[S]) -> String {
    let mut name = String::new();
    for label in labels {
        name.push_str(label.as_ref());
        name.push('.');
    }

    if name.is_empty() {
        name.push('.');
    }

    name
}

/// Presentation form of one wire label: `.` and `\` are backslash escaped, anything outside
/// printable ASCII becomes `\DDD`. `labels` undoes this exactly.
pub fn escape_label(label: &[u8]) -> String {
    let mut escaped = String::with_capacity(label.len());
    for &b in label {
        match b {
            b'.' | b'\\' => {
                escaped.push('\\');
                escaped.push(b as char);
            }
            0x21..=0x7e => escaped.push(b as char),
            _ => escaped.push_str(&format!("\\{:03}", b)),
        }
    }

    escaped
}

/// The wire bytes of each non-empty label of a presentation name, with or without its
/// trailing dot.
pub fn labels(name: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut labels = Vec::new();
    let mut label = Vec::new();
    let mut bytes = name.bytes();

    while let Some(b) = bytes.next() {
        match b {
            b'.' => {
                if !label.is_empty() {
                    labels.push(std::mem::take(&mut label));
                }
            }
            b'\\' => match bytes.next() {
                Some(d) if d.is_ascii_digit() => {
                    let digits = [Some(d), bytes.next(), bytes.next()];
                    let mut value: u32 = 0;
                    for digit in &digits {
                        match digit {
                            Some(digit) if digit.is_ascii_digit() => {
                                value = value * 10 + u32::from(digit - b'0')
                            }
                            _ => anyhow::bail!("Bad \\DDD escape in {:?}", name),
                        }
                    }
                    if value > 0xff {
                        anyhow::bail!("Escape \\{} out of range in {:?}", value, name)
                    }
                    label.push(value as u8);
                }
                Some(escaped) => label.push(escaped),
                None => anyhow::bail!("Dangling escape in {:?}", name),
            },
            _ => label.push(b),
        }
    }

    if !label.is_empty() {
        labels.push(label);
    }

    Ok(labels)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fqdn_appends_trailing_dot() {
        assert_eq!(fqdn(&["web", "docker"]), "web.docker.");
        assert_eq!(fqdn::<&str>(&[]), ".");
    }

    #[test]
    fn labels_ignore_trailing_dot() {
        let expected = vec![b"web".to_vec(), b"docker".to_vec()];

        assert_eq!(labels("web.docker.").unwrap(), expected);
        assert_eq!(labels("web.docker").unwrap(), expected);
        assert!(labels(".").unwrap().is_empty());
    }

    #[test]
    fn odd_bytes_are_escaped() {
        assert_eq!(escape_label(b"a.b"), "a\\.b");
        assert_eq!(escape_label(b"back\\slash"), "back\\\\slash");
        assert_eq!(escape_label(&[0xff, b'x', 0x20]), "\\255x\\032");
    }

    #[test]
    fn escaped_labels_come_back_byte_for_byte() {
        let raw: Vec<Vec<u8>> = vec![b"a.b".to_vec(), vec![0xff; 63], b"\\".to_vec(), vec![0]];
        let escaped: Vec<String> = raw.iter().map(|label| escape_label(label)).collect();

        assert_eq!(labels(&fqdn(&escaped)).unwrap(), raw);
    }

    #[test]
    fn broken_escapes_are_rejected() {
        assert!(labels("web\\").is_err());
        assert!(labels("web\\25").is_err());
        assert!(labels("web\\256.docker").is_err());
    }
}
