//! # PVL / ODL label reader
//!
//! A small [`nom`] grammar for the *Parameter Value Language* used by PDS3 labels.
//! Only the subset found in index labels is supported:
//!
//! - `KEY = value` assignments, where keys may start with `^` (pointers),
//! - nested `OBJECT = NAME … END_OBJECT [= NAME]` and `GROUP … END_GROUP` blocks,
//! - values: quoted text (possibly spanning several lines), `'symbols'`, bare literals
//!   (numbers, identifiers, dates), `( … )` sequences and `{ … }` sets, each optionally
//!   followed by a `<UNIT>`,
//! - `/* … */` comments,
//! - a final `END` statement; anything after it is ignored.
//!
//! Keys are compared case-insensitively when looking values up.
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, multispace1},
    combinator::{map, opt, value},
    multi::{many0_count, separated_list0},
    sequence::{delimited, preceded},
    IResult, Parser,
};

/// A parsed PVL value.
#[derive(Debug, Clone, PartialEq)]
pub enum PvlValue {
    Integer(i64),
    Real(f64),
    /// Double quoted text, with line breaks and indentation collapsed to single spaces
    Text(String),
    /// Single quoted or bare literal that is not a number
    Symbol(String),
    Sequence(Vec<PvlValue>),
    Set(Vec<PvlValue>),
    /// A value followed by a unit, e.g. `12 <BYTES>`
    Quantity(Box<PvlValue>, String),
}

impl PvlValue {
    /// Integer view of the value, looking through units.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PvlValue::Integer(i) => Some(*i),
            PvlValue::Quantity(v, _) => v.as_i64(),
            _ => None,
        }
    }

    /// Text view of textual values (quoted text or symbol).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PvlValue::Text(s) | PvlValue::Symbol(s) => Some(s),
            PvlValue::Quantity(v, _) => v.as_str(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Object,
    Group,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PvlBlock {
    pub kind: BlockKind,
    pub name: String,
    pub entries: Vec<PvlEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PvlEntry {
    Assignment(String, PvlValue),
    Block(PvlBlock),
}

/// Shared lookups over a list of entries (a whole label or one block).
pub trait PvlEntries {
    fn entries(&self) -> &[PvlEntry];

    /// First assignment with this key.
    fn get(&self, key: &str) -> Option<&PvlValue> {
        self.entries().iter().find_map(|e| match e {
            PvlEntry::Assignment(k, v) if k.eq_ignore_ascii_case(key) => Some(v),
            _ => None,
        })
    }

    /// All assignments, in order.
    fn assignments(&self) -> impl Iterator<Item = (&str, &PvlValue)> {
        self.entries().iter().filter_map(|e| match e {
            PvlEntry::Assignment(k, v) => Some((k.as_str(), v)),
            _ => None,
        })
    }

    /// All direct sub-blocks with this name, in order.
    fn blocks<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PvlBlock> + 'a {
        self.entries().iter().filter_map(move |e| match e {
            PvlEntry::Block(b) if b.name.eq_ignore_ascii_case(name) => Some(b),
            _ => None,
        })
    }

    /// First direct sub-block with this name.
    fn block<'a>(&'a self, name: &str) -> Option<&'a PvlBlock> {
        self.entries().iter().find_map(|e| match e {
            PvlEntry::Block(b) if b.name.eq_ignore_ascii_case(name) => Some(b),
            _ => None,
        })
    }
}

impl PvlEntries for PvlBlock {
    fn entries(&self) -> &[PvlEntry] {
        &self.entries
    }
}

/// A complete label document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PvlModule {
    pub entries: Vec<PvlEntry>,
}

impl PvlEntries for PvlModule {
    fn entries(&self) -> &[PvlEntry] {
        &self.entries
    }
}

/// Location of a syntax error.
#[derive(Debug, Clone, PartialEq)]
pub struct PvlSyntaxError {
    pub line: usize,
    pub context: String,
}

fn comment(input: &str) -> IResult<&str, &str> {
    delimited(tag("/*"), take_until("*/"), tag("*/")).parse(input)
}

/// Whitespace and comments.
fn ws(input: &str) -> IResult<&str, ()> {
    value((), many0_count(alt((multispace1, comment)))).parse(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '^' | ':')).parse(input)
}

fn quoted_text(input: &str) -> IResult<&str, PvlValue> {
    map(
        delimited(char('"'), take_until("\""), char('"')),
        |s: &str| PvlValue::Text(s.split_whitespace().collect::<Vec<_>>().join(" ")),
    )
    .parse(input)
}

fn quoted_symbol(input: &str) -> IResult<&str, PvlValue> {
    map(delimited(char('\''), take_until("'"), char('\'')), |s: &str| {
        PvlValue::Symbol(s.to_string())
    })
    .parse(input)
}

fn bare_literal(input: &str) -> IResult<&str, PvlValue> {
    map(
        take_while1(|c: char| {
            !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | '{' | '}' | '<' | '=' | '"')
        }),
        |s: &str| {
            if let Ok(i) = s.parse::<i64>() {
                PvlValue::Integer(i)
            } else if let Ok(f) = s.parse::<f64>() {
                PvlValue::Real(f)
            } else {
                PvlValue::Symbol(s.to_string())
            }
        },
    )
    .parse(input)
}

fn unit(input: &str) -> IResult<&str, &str> {
    preceded(ws, delimited(char('<'), take_until(">"), char('>'))).parse(input)
}

fn list_of(open: char, close: char) -> impl Fn(&str) -> IResult<&str, Vec<PvlValue>> {
    move |input| {
        delimited(
            (char(open), ws),
            separated_list0((ws, char(','), ws), pvl_value),
            (ws, char(close)),
        )
        .parse(input)
    }
}

fn pvl_value(input: &str) -> IResult<&str, PvlValue> {
    let (input, base) = alt((
        map(list_of('(', ')'), PvlValue::Sequence),
        map(list_of('{', '}'), PvlValue::Set),
        quoted_text,
        quoted_symbol,
        bare_literal,
    ))
    .parse(input)?;

    let (input, unit) = opt(unit).parse(input)?;
    Ok(match unit {
        Some(u) => (input, PvlValue::Quantity(Box::new(base), u.trim().to_string())),
        None => (input, base),
    })
}

/// Optional `= NAME` after END_OBJECT / END_GROUP.
fn closing_name(input: &str) -> IResult<&str, Option<&str>> {
    opt(preceded((ws, char('='), ws), identifier)).parse(input)
}

fn block_name(input: &str) -> IResult<&str, &str> {
    preceded((ws, char('='), ws), identifier).parse(input)
}

fn statements(input: &str) -> IResult<&str, Vec<PvlEntry>> {
    let mut entries = Vec::new();
    let mut input = input;
    loop {
        let (rest, _) = ws(input)?;
        input = rest;
        if input.is_empty() {
            return Ok((input, entries));
        }

        let (rest, key) = identifier(input)?;
        let upper = key.to_ascii_uppercase();
        match upper.as_str() {
            "END" => return Ok(("", entries)),
            "END_OBJECT" | "END_GROUP" => {
                let (rest, _) = closing_name(rest)?;
                return Ok((rest, entries));
            }
            "OBJECT" | "BEGIN_OBJECT" | "GROUP" | "BEGIN_GROUP" => {
                let kind = if upper.ends_with("OBJECT") {
                    BlockKind::Object
                } else {
                    BlockKind::Group
                };
                let (rest, name) = block_name(rest)?;
                let (rest, children) = statements(rest)?;
                entries.push(PvlEntry::Block(PvlBlock {
                    kind,
                    name: name.to_string(),
                    entries: children,
                }));
                input = rest;
            }
            _ => {
                let (rest, value) = preceded((ws, char('='), ws), pvl_value).parse(rest)?;
                entries.push(PvlEntry::Assignment(key.to_string(), value));
                input = rest;
            }
        }
    }
}

/// Parse a complete label text.
///
/// Arguments
/// -----------------
/// * `text`: the label content.
///
/// Return
/// ----------
/// * The label tree, or the line at which parsing stopped.
pub fn parse_label(text: &str) -> Result<PvlModule, PvlSyntaxError> {
    match statements(text) {
        Ok((_, entries)) => Ok(PvlModule { entries }),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let offset = text.len() - e.input.len();
            let line = text[..offset].matches('\n').count() + 1;
            let context = e.input.lines().next().unwrap_or_default().trim().to_string();
            Err(PvlSyntaxError { line, context })
        }
        Err(nom::Err::Incomplete(_)) => Err(PvlSyntaxError {
            line: text.lines().count(),
            context: "unexpected end of label".into(),
        }),
    }
}

#[cfg(test)]
mod pvl_test {
    use super::*;

    const LABEL: &str = r#"PDS_VERSION_ID       = PDS3
/* comment line */
RECORD_BYTES         = 120
^INDEX_TABLE         = "CUMINDEX.TAB"
OBJECT               = INDEX_TABLE
  ROWS               = 2
  DESCRIPTION        = "first line
                        second line"
  OBJECT             = COLUMN
    NAME             = VOLUME_ID
    START_BYTE       = 2
    BYTES            = 10 <BYTES>
  END_OBJECT         = COLUMN
  GROUP              = EXTRA
    SCALE            = 0.5
    BANDS            = (1, 2, 'three')
    FLAGS            = {A, B}
  END_GROUP          = EXTRA
END_OBJECT           = INDEX_TABLE
END
garbage after end
"#;

    #[test]
    fn test_parse_label_tree() {
        let module = parse_label(LABEL).unwrap();
        assert_eq!(module.get("record_bytes"), Some(&PvlValue::Integer(120)));
        assert_eq!(
            module.get("^INDEX_TABLE"),
            Some(&PvlValue::Text("CUMINDEX.TAB".into()))
        );

        let table = module.block("INDEX_TABLE").unwrap();
        assert_eq!(table.kind, BlockKind::Object);
        assert_eq!(
            table.get("DESCRIPTION").and_then(|v| v.as_str()),
            Some("first line second line")
        );

        let column = table.block("COLUMN").unwrap();
        assert_eq!(column.get("BYTES").and_then(|v| v.as_i64()), Some(10));
        assert_eq!(column.get("NAME").and_then(|v| v.as_str()), Some("VOLUME_ID"));

        let extra = table.block("EXTRA").unwrap();
        assert_eq!(extra.kind, BlockKind::Group);
        assert_eq!(extra.get("SCALE"), Some(&PvlValue::Real(0.5)));
        assert_eq!(
            extra.get("BANDS"),
            Some(&PvlValue::Sequence(vec![
                PvlValue::Integer(1),
                PvlValue::Integer(2),
                PvlValue::Symbol("three".into())
            ]))
        );
        assert_eq!(
            extra.get("FLAGS"),
            Some(&PvlValue::Set(vec![
                PvlValue::Symbol("A".into()),
                PvlValue::Symbol("B".into())
            ]))
        );
    }

    #[test]
    fn test_pointer_with_offset_and_dates() {
        let module = parse_label(
            "^TABLE = (\"INDEX.TAB\", 3)\nSTART_TIME = 2006-323T02:49:07.152\nEND\n",
        )
        .unwrap();
        assert_eq!(
            module.get("^TABLE"),
            Some(&PvlValue::Sequence(vec![
                PvlValue::Text("INDEX.TAB".into()),
                PvlValue::Integer(3)
            ]))
        );
        assert_eq!(
            module.get("START_TIME"),
            Some(&PvlValue::Symbol("2006-323T02:49:07.152".into()))
        );
    }

    #[test]
    fn test_syntax_error_line() {
        let err = parse_label("A = 1\nB 2\nEND\n").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
