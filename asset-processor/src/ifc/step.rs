//! ISO 10303-21 (STEP physical file) lexing and parameter parsing.

use std::borrow::Cow;

/// A parameter value of a STEP record.
#[derive(Debug, Clone, PartialEq)]
pub enum StepValue {
    /// `$`
    Unset,
    /// `*`
    Derived,
    /// `#123`
    Ref(u64),
    /// `'text'`, decoded
    Str(String),
    /// `.ENUM.`
    Enum(String),
    Number(f64),
    /// `"0A1F"` binary literal, kept as written
    Binary(String),
    List(Vec<StepValue>),
    /// `IFCLABEL('x')`
    Typed(String, Vec<StepValue>),
}

impl StepValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Typed(_, values) if values.len() == 1 => values[0].as_str(),
            _ => None,
        }
    }

    /// Strings of a list, skipping anything else.
    pub fn strings(&self) -> Vec<String> {
        match self {
            Self::List(values) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            other => other.as_str().map(str::to_string).into_iter().collect(),
        }
    }
}

/// A keyword followed by its parameter list, e.g. `FILE_SCHEMA(('IFC4'))`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub params: Vec<StepValue>,
}

/// A `#id = RECORD(...)` statement of the DATA section.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: u64,
    pub record: Record,
}

/// Splits STEP text into statements.
///
/// Statements end at `;` outside string literals. Comments are removed and
/// the terminating `;` is dropped.
pub struct Statements<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Statements<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }
}

impl<'a> Iterator for Statements<'a> {
    type Item = Cow<'a, str>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.src.as_bytes();
        let start = self.pos;
        if start >= bytes.len() {
            return None;
        }

        // Only allocated when a comment has to be cut out.
        let mut owned: Option<String> = None;
        let mut segment = start;
        let mut in_string = false;
        let mut i = start;

        while i < bytes.len() {
            let b = bytes[i];
            if in_string {
                if b == b'\'' {
                    if bytes.get(i + 1) == Some(&b'\'') {
                        i += 2;
                        continue;
                    }
                    in_string = false;
                }
                i += 1;
                continue;
            }

            match b {
                b'\'' => {
                    in_string = true;
                    i += 1;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    owned
                        .get_or_insert_with(String::new)
                        .push_str(&self.src[segment..i]);
                    i = match self.src[i + 2..].find("*/") {
                        Some(end) => i + 2 + end + 2,
                        None => bytes.len(),
                    };
                    segment = i;
                }
                b';' => {
                    self.pos = i + 1;
                    return Some(finish(owned, &self.src[segment..i], &self.src[start..i]));
                }
                _ => i += 1,
            }
        }

        self.pos = bytes.len();
        let statement = finish(owned, &self.src[segment..], &self.src[start..]);
        (!statement.is_empty()).then_some(statement)
    }
}

fn finish<'a>(owned: Option<String>, tail: &'a str, whole: &'a str) -> Cow<'a, str> {
    match owned {
        Some(mut text) => {
            text.push_str(tail);
            Cow::Owned(text.trim().to_string())
        }
        None => Cow::Borrowed(whole.trim()),
    }
}

/// Parse `NAME(params)` or, for complex instances, `(A(..) B(..))`.
///
/// A complex instance is reported under its first partial record.
pub fn parse_record(text: &str) -> Result<Record, String> {
    let mut parser = Parser::new(text);
    parser.skip_ws();
    if parser.peek() == Some(b'(') {
        parser.bump();
        parser.skip_ws();
        let name = parser.keyword()?;
        let params = parser.list()?;
        return Ok(Record { name, params });
    }
    let name = parser.keyword()?;
    let params = parser.list()?;
    Ok(Record { name, params })
}

/// Parse a DATA section statement `#id = RECORD(...)`.
pub fn parse_instance(text: &str) -> Result<Instance, String> {
    let rest = text
        .trim_start()
        .strip_prefix('#')
        .ok_or("instance does not start with '#'")?;
    let (id, body) = rest.split_once('=').ok_or("missing '=' after instance id")?;
    let id = id
        .trim()
        .parse()
        .map_err(|_| format!("invalid instance id '{}'", id.trim()))?;
    Ok(Instance {
        id,
        record: parse_record(body)?,
    })
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), String> {
        self.skip_ws();
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(format!(
                "expected '{}' at offset {}, found '{}'",
                expected as char, self.pos, b as char
            )),
            None => Err(format!("expected '{}', found end of input", expected as char)),
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn keyword(&mut self) -> Result<String, String> {
        self.skip_ws();
        let word = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if word.is_empty() {
            return Err(format!("expected keyword at offset {}", self.pos));
        }
        Ok(word.to_ascii_uppercase())
    }

    fn list(&mut self) -> Result<Vec<StepValue>, String> {
        self.expect(b'(')?;
        let mut values = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b')') {
            self.bump();
            return Ok(values);
        }
        loop {
            values.push(self.value()?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => self.bump(),
                Some(b')') => {
                    self.bump();
                    return Ok(values);
                }
                Some(b) => {
                    return Err(format!(
                        "unexpected '{}' at offset {} in list",
                        b as char, self.pos
                    ));
                }
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn value(&mut self) -> Result<StepValue, String> {
        self.skip_ws();
        let Some(b) = self.peek() else {
            return Err("expected value, found end of input".to_string());
        };
        match b {
            b'$' => {
                self.bump();
                Ok(StepValue::Unset)
            }
            b'*' => {
                self.bump();
                Ok(StepValue::Derived)
            }
            b'#' => {
                self.bump();
                let digits = self.take_while(|b| b.is_ascii_digit());
                digits
                    .parse()
                    .map(StepValue::Ref)
                    .map_err(|_| format!("invalid reference at offset {}", self.pos))
            }
            b'\'' => self.string().map(StepValue::Str),
            b'"' => {
                self.bump();
                let hex = self.take_while(|b| b != b'"');
                self.expect(b'"')?;
                Ok(StepValue::Binary(hex.to_string()))
            }
            b'(' => self.list().map(StepValue::List),
            b'.' if self
                .bytes
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_alphabetic()) =>
            {
                self.bump();
                let name = self.take_while(|b| b != b'.');
                self.expect(b'.')?;
                Ok(StepValue::Enum(name.to_string()))
            }
            b'-' | b'+' | b'.' | b'0'..=b'9' => {
                let number = self.take_while(|b| {
                    b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'E' | b'e')
                });
                number
                    .parse()
                    .map(StepValue::Number)
                    .map_err(|_| format!("invalid number '{number}'"))
            }
            b if b.is_ascii_alphabetic() => {
                let name = self.keyword()?;
                let params = self.list()?;
                Ok(StepValue::Typed(name, params))
            }
            other => Err(format!(
                "unexpected '{}' at offset {}",
                other as char, self.pos
            )),
        }
    }

    fn string(&mut self) -> Result<String, String> {
        self.expect(b'\'')?;
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'\'') if self.bytes.get(self.pos + 1) == Some(&b'\'') => self.pos += 2,
                Some(b'\'') => {
                    let raw = &self.text[start..self.pos];
                    self.bump();
                    return Ok(decode_string(raw));
                }
                Some(_) => self.pos += 1,
                None => return Err("unterminated string".to_string()),
            }
        }
    }
}

/// Decode the control directives of a STEP string literal.
///
/// Handles `''`, `\\`, `\S\c`, `\X\hh`, `\X2\...\X0\` and `\X4\...\X0\`.
/// Code page switches (`\PA\`) are dropped.
pub fn decode_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("''") {
            out.push('\'');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\\\") {
            out.push('\\');
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("\\X2\\") {
            rest = decode_wide(tail, 4, &mut out);
        } else if let Some(tail) = rest.strip_prefix("\\X4\\") {
            rest = decode_wide(tail, 8, &mut out);
        } else if let Some(tail) = rest.strip_prefix("\\X\\")
            && let Some(hex) = tail.get(..2)
            && let Ok(code) = u8::from_str_radix(hex, 16)
        {
            out.push(char::from(code));
            rest = &tail[2..];
        } else if let Some(tail) = rest.strip_prefix("\\S\\")
            && let Some(c) = tail.chars().next()
            && c.is_ascii()
        {
            out.push(char::from(c as u8 + 128));
            rest = &tail[1..];
        } else if rest.starts_with("\\P")
            && rest.get(3..4) == Some("\\")
        {
            rest = &rest[4..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    out
}

/// Decode hex code units of `width` digits up to `\X0\`.
fn decode_wide<'a>(mut rest: &'a str, width: usize, out: &mut String) -> &'a str {
    let mut units: Vec<u32> = Vec::new();
    while let Some(hex) = rest.get(..width) {
        match u32::from_str_radix(hex, 16) {
            Ok(unit) if !hex.starts_with('\\') => {
                units.push(unit);
                rest = &rest[width..];
            }
            _ => break,
        }
    }
    rest = rest.strip_prefix("\\X0\\").unwrap_or(rest);

    if width == 4 {
        let utf16: Vec<u16> = units.iter().map(|&u| u as u16).collect();
        out.extend(char::decode_utf16(utf16).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)));
    } else {
        out.extend(
            units
                .into_iter()
                .map(|u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER)),
        );
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_split_outside_strings_and_comments() {
        let src = "HEADER;\n/* note; with semicolon */FILE_NAME('a;b','x''y');\nDATA;\n#1=IFCX($);\nENDSEC;";
        let statements: Vec<_> = Statements::new(src).collect();
        assert_eq!(
            statements,
            vec!["HEADER", "FILE_NAME('a;b','x''y')", "DATA", "#1=IFCX($)", "ENDSEC"]
        );
    }

    #[test]
    fn instance_with_nested_values() {
        let instance = parse_instance(
            "#12= IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',#5,'Wall ''A''',$,*,(#1,#2),.ELEMENT.,-1.5E2,IFCLABEL('x'))",
        )
        .unwrap();
        assert_eq!(instance.id, 12);
        assert_eq!(instance.record.name, "IFCWALL");
        let p = &instance.record.params;
        assert_eq!(p[0], StepValue::Str("2O2Fr$t4X7Zf8NOew3FLOH".into()));
        assert_eq!(p[1], StepValue::Ref(5));
        assert_eq!(p[2].as_str(), Some("Wall 'A'"));
        assert_eq!(p[3], StepValue::Unset);
        assert_eq!(p[4], StepValue::Derived);
        assert_eq!(p[5], StepValue::List(vec![StepValue::Ref(1), StepValue::Ref(2)]));
        assert_eq!(p[6], StepValue::Enum("ELEMENT".into()));
        assert_eq!(p[7], StepValue::Number(-150.0));
        assert_eq!(p[8].as_str(), Some("x"));
    }

    #[test]
    fn complex_instance_uses_first_record() {
        let instance = parse_instance("#7=(IFCA(1) IFCB(2))").unwrap();
        assert_eq!(instance.record.name, "IFCA");
        assert_eq!(instance.record.params, vec![StepValue::Number(1.0)]);
    }

    #[test]
    fn malformed_instances_are_errors() {
        assert!(parse_instance("IFCWALL()").is_err());
        assert!(parse_instance("#x=IFCWALL()").is_err());
        assert!(parse_instance("#1=IFCWALL('open").is_err());
        assert!(parse_instance("#1=IFCWALL(#1 #2)").is_err());
    }

    #[test]
    fn string_directives_are_decoded() {
        assert_eq!(decode_string("caf\\X2\\00E9\\X0\\"), "café");
        assert_eq!(decode_string("\\X\\C4pfel"), "Äpfel");
        assert_eq!(decode_string("a\\\\b"), "a\\b");
        assert_eq!(decode_string("\\X4\\0001F600\\X0\\!"), "😀!");
        assert_eq!(decode_string("\\PA\\plain"), "plain");
    }
}
