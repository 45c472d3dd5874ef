//! Tokenize Module for Twigify
//!
//! Splits Twig template text into the precompiled token layout the Twig.js
//! runtime rebuilds templates from: raw text, `{{ output }}` tokens carrying a
//! compiled expression stack, and `{% logic %}` tokens wrapping a
//! `Twig.logic.type.*` record. Expression stacks are in postfix order, the way
//! the runtime evaluates them. Nothing is rendered or evaluated here.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::{Match, Regex};
use serde::{Serialize, Serializer};
use serde_json::Number;
use tracing::trace;

use crate::error::TokenizeError;

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Turns template text into a tree the runtime can rebuild a template from.
///
/// `Tree` must serialize deterministically so builds are reproducible.
pub trait Tokenizer {
    type Tree: Serialize;

    fn tokenize(&self, id: &str, source: &str) -> Result<Self::Tree, TokenizeError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Associativity {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub value: String,
    // spelled as the runtime reads it
    pub precidence: u8,
    pub associativity: Associativity,
    pub operator: String,
    /// Object key, for `:` inside a hash literal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Computed object key, for `(expr): value`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<ExprToken>>,
}

/// One entry of a compiled expression stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ExprToken {
    #[serde(rename = "Twig.expression.type.string")]
    String { value: String },
    #[serde(rename = "Twig.expression.type.number")]
    Number {
        value: Number,
        #[serde(rename = "match")]
        matched: Vec<Option<String>>,
    },
    #[serde(rename = "Twig.expression.type.bool")]
    Bool { value: bool },
    #[serde(rename = "Twig.expression.type.null")]
    Null { value: () },
    #[serde(rename = "Twig.expression.type.variable")]
    Variable {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
    #[serde(rename = "Twig.expression.type.key.period")]
    Period {
        key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type.key.brackets")]
    Brackets {
        stack: Vec<ExprToken>,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type.filter")]
    Filter {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type._function")]
    Function {
        #[serde(rename = "fn")]
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type.test")]
    Test {
        filter: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        modifier: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type.operator.binary")]
    Binary(Operator),
    #[serde(rename = "Twig.expression.type.operator.unary")]
    Unary(Operator),
    #[serde(rename = "Twig.expression.type.comma")]
    Comma,
    #[serde(rename = "Twig.expression.type.parameter.start")]
    ParamStart {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
    #[serde(rename = "Twig.expression.type.parameter.end")]
    ParamEnd {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
        expression: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        params: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.expression.type.array.start")]
    ArrayStart {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
    #[serde(rename = "Twig.expression.type.array.end")]
    ArrayEnd {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
    #[serde(rename = "Twig.expression.type.object.start")]
    ObjectStart {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
    #[serde(rename = "Twig.expression.type.object.end")]
    ObjectEnd {
        value: String,
        #[serde(rename = "match")]
        matched: Vec<String>,
    },
}

impl ExprToken {
    fn operator(&self) -> Option<&Operator> {
        match self {
            ExprToken::Binary(op) | ExprToken::Unary(op) => Some(op),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE TOKENS
// ═══════════════════════════════════════════════════════════════════════════════

/// A compiled `{% ... %}` tag. Tags that open a block carry their body in
/// `output`; end tags never appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum LogicToken {
    #[serde(rename = "Twig.logic.type.if")]
    If {
        stack: Vec<ExprToken>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.elseif")]
    ElseIf {
        stack: Vec<ExprToken>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.else")]
    Else {
        #[serde(rename = "match")]
        matched: Vec<String>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.for", rename_all = "camelCase")]
    For {
        key_var: Option<String>,
        value_var: String,
        expression: Vec<ExprToken>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conditional: Option<Vec<ExprToken>>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.set")]
    Set {
        key: String,
        expression: Vec<ExprToken>,
    },
    #[serde(rename = "Twig.logic.type.setcapture")]
    SetCapture { key: String, output: Vec<Token> },
    #[serde(rename = "Twig.logic.type.block", rename_all = "camelCase")]
    Block {
        block_name: String,
        output: Vec<Token>,
    },
    /// `{% block name expr %}`: the expression stack sits in `output`.
    #[serde(rename = "Twig.logic.type.shortblock", rename_all = "camelCase")]
    ShortBlock {
        expression: String,
        output: Vec<ExprToken>,
        block_name: String,
    },
    #[serde(rename = "Twig.logic.type.filter")]
    Filter {
        stack: Vec<ExprToken>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.spaceless")]
    Spaceless {
        #[serde(rename = "match")]
        matched: Vec<String>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.macro", rename_all = "camelCase")]
    Macro {
        macro_name: String,
        parameters: Vec<String>,
        #[serde(serialize_with = "ordered_map")]
        defaults: IndexMap<String, Vec<ExprToken>>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.import", rename_all = "camelCase")]
    Import {
        expression: String,
        context_name: String,
        stack: Vec<ExprToken>,
    },
    #[serde(rename = "Twig.logic.type.from", rename_all = "camelCase")]
    From {
        expression: String,
        #[serde(serialize_with = "ordered_map")]
        macro_names: IndexMap<String, String>,
        stack: Vec<ExprToken>,
    },
    #[serde(rename = "Twig.logic.type.use")]
    Use { stack: Vec<ExprToken> },
    #[serde(rename = "Twig.logic.type.include", rename_all = "camelCase")]
    Include {
        only: bool,
        ignore_missing: bool,
        stack: Vec<ExprToken>,
        #[serde(skip_serializing_if = "Option::is_none")]
        with_stack: Option<Vec<ExprToken>>,
    },
    #[serde(rename = "Twig.logic.type.extends")]
    Extends { stack: Vec<ExprToken> },
    #[serde(rename = "Twig.logic.type.embed", rename_all = "camelCase")]
    Embed {
        only: bool,
        ignore_missing: bool,
        stack: Vec<ExprToken>,
        #[serde(skip_serializing_if = "Option::is_none")]
        with_stack: Option<Vec<ExprToken>>,
        output: Vec<Token>,
    },
    #[serde(rename = "Twig.logic.type.with", rename_all = "camelCase")]
    With {
        only: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        with_stack: Option<Vec<ExprToken>>,
        output: Vec<Token>,
    },
}

fn ordered_map<S, V>(map: &IndexMap<String, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize,
{
    serializer.collect_map(map.iter())
}

impl LogicToken {
    /// The Twig tag this token was compiled from.
    pub fn tag(&self) -> &'static str {
        match self {
            LogicToken::If { .. } => "if",
            LogicToken::ElseIf { .. } => "elseif",
            LogicToken::Else { .. } => "else",
            LogicToken::For { .. } => "for",
            LogicToken::Set { .. } | LogicToken::SetCapture { .. } => "set",
            LogicToken::Block { .. } | LogicToken::ShortBlock { .. } => "block",
            LogicToken::Filter { .. } => "filter",
            LogicToken::Spaceless { .. } => "spaceless",
            LogicToken::Macro { .. } => "macro",
            LogicToken::Import { .. } => "import",
            LogicToken::From { .. } => "from",
            LogicToken::Use { .. } => "use",
            LogicToken::Include { .. } => "include",
            LogicToken::Extends { .. } => "extends",
            LogicToken::Embed { .. } => "embed",
            LogicToken::With { .. } => "with",
        }
    }

    /// Nested template body, for tags that open a block.
    pub fn body(&self) -> Option<&[Token]> {
        match self {
            LogicToken::If { output, .. }
            | LogicToken::ElseIf { output, .. }
            | LogicToken::Else { output, .. }
            | LogicToken::For { output, .. }
            | LogicToken::SetCapture { output, .. }
            | LogicToken::Block { output, .. }
            | LogicToken::Filter { output, .. }
            | LogicToken::Spaceless { output, .. }
            | LogicToken::Macro { output, .. }
            | LogicToken::Embed { output, .. }
            | LogicToken::With { output, .. } => Some(output),
            _ => None,
        }
    }

    fn body_mut(&mut self) -> Option<&mut Vec<Token>> {
        match self {
            LogicToken::If { output, .. }
            | LogicToken::ElseIf { output, .. }
            | LogicToken::Else { output, .. }
            | LogicToken::For { output, .. }
            | LogicToken::SetCapture { output, .. }
            | LogicToken::Block { output, .. }
            | LogicToken::Filter { output, .. }
            | LogicToken::Spaceless { output, .. }
            | LogicToken::Macro { output, .. }
            | LogicToken::Embed { output, .. }
            | LogicToken::With { output, .. } => Some(output),
            _ => None,
        }
    }

    /// End tag and allowed intermediate tags, for tokens that open a block.
    fn closing(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            LogicToken::If { .. } | LogicToken::ElseIf { .. } => Some(("endif", IF_BRANCHES)),
            LogicToken::For { .. } => Some(("endfor", FOR_BRANCHES)),
            LogicToken::SetCapture { .. } => Some(("endset", NO_BRANCHES)),
            LogicToken::Block { .. } => Some(("endblock", NO_BRANCHES)),
            LogicToken::Filter { .. } => Some(("endfilter", NO_BRANCHES)),
            LogicToken::Spaceless { .. } => Some(("endspaceless", NO_BRANCHES)),
            LogicToken::Macro { .. } => Some(("endmacro", NO_BRANCHES)),
            LogicToken::Embed { .. } => Some(("endembed", NO_BRANCHES)),
            LogicToken::With { .. } => Some(("endwith", NO_BRANCHES)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Token {
    Raw { value: String },
    Output { stack: Vec<ExprToken> },
    Logic { token: LogicToken },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct TokenTree(pub Vec<Token>);

impl TokenTree {
    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    /// All raw text in document order, nested bodies included.
    pub fn raw_text(&self) -> String {
        fn collect(tokens: &[Token], out: &mut String) {
            for token in tokens {
                match token {
                    Token::Raw { value } => out.push_str(value),
                    Token::Logic { token } => collect(token.body().unwrap_or_default(), out),
                    Token::Output { .. } => {}
                }
            }
        }
        let mut out = String::new();
        collect(&self.0, &mut out);
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TABLES
// ═══════════════════════════════════════════════════════════════════════════════

const END_TAGS: &[&str] = &[
    "endif",
    "endfor",
    "endset",
    "endblock",
    "endfilter",
    "endspaceless",
    "endmacro",
    "endembed",
    "endwith",
    "endverbatim",
    "endraw",
];

const VERBATIM_TAGS: &[&str] = &["verbatim", "raw"];

const IF_BRANCHES: &[&str] = &["elseif", "else"];
const FOR_BRANCHES: &[&str] = &["else"];
const NO_BRANCHES: &[&str] = &[];

/// Longest symbols first so `<=` wins over `<`.
const OPERATORS: &[(&str, u8, Associativity)] = &[
    ("..", 20, Associativity::LeftToRight),
    ("??", 15, Associativity::RightToLeft),
    ("?:", 16, Associativity::RightToLeft),
    ("?", 16, Associativity::RightToLeft),
    (":", 16, Associativity::RightToLeft),
    ("==", 9, Associativity::LeftToRight),
    ("!=", 9, Associativity::LeftToRight),
    ("<=", 8, Associativity::LeftToRight),
    (">=", 8, Associativity::LeftToRight),
    ("<", 8, Associativity::LeftToRight),
    (">", 8, Associativity::LeftToRight),
    ("~", 6, Associativity::LeftToRight),
    ("+", 6, Associativity::LeftToRight),
    ("-", 6, Associativity::LeftToRight),
    ("//", 5, Associativity::LeftToRight),
    ("**", 5, Associativity::LeftToRight),
    ("*", 5, Associativity::LeftToRight),
    ("/", 5, Associativity::LeftToRight),
    ("%", 5, Associativity::LeftToRight),
    ("or", 14, Associativity::LeftToRight),
    ("and", 13, Associativity::LeftToRight),
    ("b-or", 12, Associativity::LeftToRight),
    ("b-xor", 11, Associativity::LeftToRight),
    ("b-and", 10, Associativity::LeftToRight),
    ("in", 8, Associativity::LeftToRight),
    ("not in", 8, Associativity::LeftToRight),
    ("not", 3, Associativity::RightToLeft),
];

lazy_static! {
    static ref VERBATIM_END_RE: Regex =
        Regex::new(r"\{%(-?)\s*(endverbatim|endraw)\s*(-?)%\}").unwrap();
    static ref TAG_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap();
    static ref FOR_RE: Regex =
        Regex::new(r"^([A-Za-z0-9_,\s]+?)\s+in\s+(\S[\s\S]*?)(?:\s+if\s+(\S[\s\S]*))?$").unwrap();
    static ref SET_RE: Regex = Regex::new(r"^([A-Za-z0-9_,\s]+?)\s*=\s*(\S[\s\S]*)$").unwrap();
    static ref SET_CAPTURE_RE: Regex = Regex::new(r"^[A-Za-z0-9_,\s]+$").unwrap();
    static ref BLOCK_RE: Regex = Regex::new(r"^(\w+)(?:\s+(\S[\s\S]*))?$").unwrap();
    static ref MACRO_RE: Regex = Regex::new(r"^([A-Za-z0-9_]+)\s*\(([\s\S]*)\)$").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    static ref IMPORT_RE: Regex = Regex::new(r"^([\s\S]+)\s+as\s+([A-Za-z0-9_]+)$").unwrap();
    static ref FROM_RE: Regex = Regex::new(r"^([\s\S]+)\s+import\s+([A-Za-z0-9_,\s]+)$").unwrap();
    static ref ALIAS_RE: Regex = Regex::new(r"^([A-Za-z0-9_]+)\s+as\s+([A-Za-z0-9_]+)$").unwrap();
    static ref INCLUDE_RE: Regex = Regex::new(
        r"^([\s\S]+?)(\s+ignore\s+missing)?(?:\s+with\s+([\s\S]+?))?(\s+only)?$"
    )
    .unwrap();
}

fn lookup(op: &str) -> Option<(u8, Associativity)> {
    OPERATORS
        .iter()
        .find(|(name, ..)| *name == op)
        .map(|(_, precedence, associativity)| (*precedence, *associativity))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE LEXING
// ═══════════════════════════════════════════════════════════════════════════════

enum Item {
    Raw(String),
    Output {
        stack: Vec<ExprToken>,
    },
    Tag {
        name: String,
        args: String,
        args_offset: usize,
        offset: usize,
    },
}

#[derive(Clone, Copy, PartialEq)]
enum Delimiter {
    Output,
    Logic,
    Comment,
}

impl Delimiter {
    fn close(self) -> &'static str {
        match self {
            Delimiter::Output => "}}",
            Delimiter::Logic => "%}",
            Delimiter::Comment => "#}",
        }
    }
}

fn find_open(bytes: &[u8], from: usize) -> Option<(usize, Delimiter)> {
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' {
            let kind = match bytes[i + 1] {
                b'{' => Some(Delimiter::Output),
                b'%' => Some(Delimiter::Logic),
                b'#' => Some(Delimiter::Comment),
                _ => None,
            };
            if let Some(kind) = kind {
                return Some((i, kind));
            }
        }
        i += 1;
    }
    None
}

/// Byte index of the closing delimiter. Quoted strings are skipped except
/// inside comments.
fn find_close(
    source: &str,
    open: usize,
    from: usize,
    kind: Delimiter,
) -> Result<usize, TokenizeError> {
    let bytes = source.as_bytes();
    let close = kind.close().as_bytes();
    let mut quote: Option<(u8, usize)> = None;
    let mut i = from;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some((q, _)) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                }
            }
            None => {
                if bytes[i..].starts_with(close) {
                    return Ok(i);
                }
                if kind != Delimiter::Comment && (b == b'"' || b == b'\'') {
                    quote = Some((b, i));
                }
            }
        }
        i += 1;
    }

    match quote {
        Some((_, start)) => Err(TokenizeError::new("Unterminated string literal", start)),
        None => Err(TokenizeError::new(
            format!("Unable to find closing bracket '{}'", kind.close()),
            open,
        )),
    }
}

fn push_raw(items: &mut Vec<Item>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        items.push(Item::Raw(text.to_string()));
    }
}

fn trim_last_raw(items: &mut Vec<Item>) {
    if let Some(Item::Raw(value)) = items.last_mut() {
        let trimmed_len = value.trim_end().len();
        value.truncate(trimmed_len);
        if value.is_empty() {
            items.pop();
        }
    }
}

fn lex(source: &str) -> Result<Vec<Item>, TokenizeError> {
    let bytes = source.as_bytes();
    let mut items = Vec::new();
    let mut pos = 0;
    let mut trim_next = false;

    while pos < source.len() {
        let Some((open, kind)) = find_open(bytes, pos) else {
            push_raw(&mut items, &source[pos..], trim_next);
            break;
        };
        push_raw(&mut items, &source[pos..open], trim_next);

        let inner_start = open + 2;
        let end = find_close(source, open, inner_start, kind)?;
        let mut inner = &source[inner_start..end];
        let mut inner_offset = inner_start;
        if let Some(stripped) = inner.strip_prefix('-') {
            trim_last_raw(&mut items);
            inner = stripped;
            inner_offset += 1;
        }
        trim_next = false;
        if let Some(stripped) = inner.strip_suffix('-') {
            inner = stripped;
            trim_next = true;
        }
        pos = end + 2;

        match kind {
            Delimiter::Comment => {}
            Delimiter::Output => {
                let stack = compile_expression(inner, inner_offset)?;
                if stack.is_empty() {
                    return Err(TokenizeError::new("Empty output expression", open));
                }
                items.push(Item::Output { stack });
            }
            Delimiter::Logic => {
                let leading = inner.len() - inner.trim_start().len();
                let body = inner.trim();
                let Some(name_match) = TAG_NAME_RE.find(body) else {
                    return Err(TokenizeError::new("Missing tag name", open));
                };
                let name = name_match.as_str().to_string();
                let rest = &body[name_match.end()..];
                let args = rest.trim();
                let args_offset = inner_offset
                    + leading
                    + name_match.end()
                    + (rest.len() - rest.trim_start().len());

                if VERBATIM_TAGS.contains(&name.as_str()) {
                    let (body, next, trim) = take_verbatim(source, pos, &name, trim_next, open)?;
                    push_raw(&mut items, &body, false);
                    pos = next;
                    trim_next = trim;
                } else {
                    items.push(Item::Tag {
                        name,
                        args: args.to_string(),
                        args_offset,
                        offset: open,
                    });
                }
            }
        }
    }

    Ok(items)
}

/// Everything up to the matching end tag, unparsed.
fn take_verbatim(
    source: &str,
    from: usize,
    name: &str,
    trim_start: bool,
    open: usize,
) -> Result<(String, usize, bool), TokenizeError> {
    let expected = format!("end{}", name);
    let end = VERBATIM_END_RE
        .captures_iter(&source[from..])
        .find(|caps| &caps[2] == expected.as_str())
        .ok_or_else(|| TokenizeError::new(format!("Unclosed '{}' block", name), open))?;

    let whole = end.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
    let mut body = &source[from..from + whole.0];
    if trim_start {
        body = body.trim_start();
    }
    if &end[1] == "-" {
        body = body.trim_end();
    }
    Ok((body.to_string(), from + whole.1, &end[3] == "-"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION LEXING
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bracket {
    Paren,
    Square,
    Curly,
}

impl Bracket {
    fn of(b: u8) -> Option<(Bracket, bool)> {
        match b {
            b'(' => Some((Bracket::Paren, true)),
            b')' => Some((Bracket::Paren, false)),
            b'[' => Some((Bracket::Square, true)),
            b']' => Some((Bracket::Square, false)),
            b'{' => Some((Bracket::Curly, true)),
            b'}' => Some((Bracket::Curly, false)),
            _ => None,
        }
    }

    fn open_char(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
            Bracket::Curly => '{',
        }
    }

    fn close_char(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Curly => '}',
        }
    }

    fn start_token(self) -> ExprToken {
        let value = self.open_char().to_string();
        let matched = vec![value.clone()];
        match self {
            Bracket::Paren => ExprToken::ParamStart { value, matched },
            Bracket::Square => ExprToken::ArrayStart { value, matched },
            Bracket::Curly => ExprToken::ObjectStart { value, matched },
        }
    }

    fn end_token(self) -> ExprToken {
        let value = self.close_char().to_string();
        let matched = vec![value.clone()];
        match self {
            Bracket::Paren => ExprToken::ParamEnd {
                value,
                matched,
                expression: false,
                params: None,
            },
            Bracket::Square => ExprToken::ArrayEnd { value, matched },
            Bracket::Curly => ExprToken::ObjectEnd { value, matched },
        }
    }
}

enum Lexeme {
    Operand(ExprToken),
    Operator { op: &'static str, unary: bool },
    Open(Bracket),
    Close(Bracket),
    Comma,
}

fn scan_word(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    i
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Unescaped string body and the index after the closing quote.
fn read_string(expr: &str, start: usize) -> Option<(String, usize)> {
    let bytes = expr.as_bytes();
    let quote = bytes[start];
    let mut value = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\\' && i + 1 < bytes.len() {
            let next = expr[i + 1..].chars().next().unwrap_or('\\');
            value.push(next);
            i += 1 + next.len_utf8();
            continue;
        }
        if c == quote {
            return Some((value, i + 1));
        }
        let ch = expr[i..].chars().next().unwrap_or(' ');
        value.push(ch);
        i += ch.len_utf8();
    }
    None
}

fn parse_number(text: &str) -> Option<Number> {
    let float = || text.parse::<f64>().ok().and_then(Number::from_f64);
    if text.contains('.') {
        float()
    } else {
        text.parse::<i64>().ok().map(Number::from).or_else(float)
    }
}

/// End of a `[...]` key starting at `start`, and whether it holds a slice.
fn find_key_end(bytes: &[u8], start: usize) -> Option<(usize, bool)> {
    let mut depth = 0;
    let mut quote: Option<u8> = None;
    let mut slice = false;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((i, slice));
                    }
                }
                b':' if depth == 1 => slice = true,
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn lex_expression(expr: &str, offset: usize) -> Result<Vec<(Lexeme, usize)>, TokenizeError> {
    let bytes = expr.as_bytes();
    let mut lexemes = Vec::new();
    let mut brackets: Vec<(Bracket, usize)> = Vec::new();
    let mut expect_operand = true;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let at = offset + i;

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if b == b'"' || b == b'\'' {
            let (value, next) = read_string(expr, i)
                .ok_or_else(|| TokenizeError::new("Unterminated string literal", at))?;
            lexemes.push((Lexeme::Operand(ExprToken::String { value }), at));
            i = next;
            expect_operand = false;
            continue;
        }

        let negative =
            expect_operand && b == b'-' && bytes.get(i + 1).map_or(false, u8::is_ascii_digit);
        if b.is_ascii_digit() || negative {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let int_end = i;
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text = &expr[start..i];
            let value = parse_number(text)
                .ok_or_else(|| TokenizeError::new(format!("Invalid number '{}'", text), at))?;
            let fraction = (i > int_end).then(|| expr[int_end..i].to_string());
            lexemes.push((
                Lexeme::Operand(ExprToken::Number {
                    value,
                    matched: vec![Some(text.to_string()), fraction],
                }),
                at,
            ));
            expect_operand = false;
            continue;
        }

        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            i = scan_word(bytes, i);
            // b-and / b-or / b-xor
            if &expr[start..i] == "b" && bytes.get(i) == Some(&b'-') {
                let end = scan_word(bytes, i + 1);
                if matches!(&expr[i + 1..end], "and" | "or" | "xor") {
                    i = end;
                }
            }
            let word = &expr[start..i];

            if !expect_operand {
                let lexeme = match word {
                    "is" => {
                        let (test, next) = lex_test(expr, i, at)?;
                        i = next;
                        test
                    }
                    "not" => {
                        let next = skip_whitespace(bytes, i);
                        let end = scan_word(bytes, next);
                        if &expr[next..end] != "in" {
                            return Err(TokenizeError::new("Unexpected 'not'", at));
                        }
                        i = end;
                        expect_operand = true;
                        Lexeme::Operator { op: "not in", unary: false }
                    }
                    _ => match OPERATORS.iter().find(|(op, ..)| *op == word && *op != "not") {
                        Some((op, ..)) => {
                            expect_operand = true;
                            Lexeme::Operator { op: *op, unary: false }
                        }
                        None => {
                            return Err(TokenizeError::new(format!("Unexpected '{}'", word), at))
                        }
                    },
                };
                lexemes.push((lexeme, at));
                continue;
            }

            let token = match word {
                "true" | "TRUE" => ExprToken::Bool { value: true },
                "false" | "FALSE" => ExprToken::Bool { value: false },
                "null" | "NULL" | "none" | "NONE" => ExprToken::Null { value: () },
                "not" => {
                    lexemes.push((Lexeme::Operator { op: "not", unary: true }, at));
                    continue;
                }
                _ if lookup(word).is_some() => {
                    return Err(TokenizeError::new(format!("Unexpected '{}'", word), at));
                }
                _ if bytes.get(skip_whitespace(bytes, i)) == Some(&b'(') => ExprToken::Function {
                    name: word.to_string(),
                    params: None,
                },
                _ => ExprToken::Variable {
                    value: word.to_string(),
                    matched: vec![word.to_string()],
                },
            };
            lexemes.push((Lexeme::Operand(token), at));
            expect_operand = false;
            continue;
        }

        if b == b'.' && !expect_operand {
            let end = scan_word(bytes, i + 1);
            if end > i + 1 {
                lexemes.push((
                    Lexeme::Operand(ExprToken::Period {
                        key: expr[i + 1..end].to_string(),
                        params: None,
                    }),
                    at,
                ));
                i = end;
                continue;
            }
        }

        if b == b'|' {
            let mut start = i + 1;
            if bytes.get(start).map_or(false, u8::is_ascii_whitespace) {
                start += 1;
            }
            let leads = bytes
                .get(start)
                .map_or(false, |c| c.is_ascii_alphabetic() || *c == b'_');
            if !leads {
                return Err(TokenizeError::new("Missing filter name after '|'", at));
            }
            let end = scan_word(bytes, start);
            lexemes.push((
                Lexeme::Operand(ExprToken::Filter {
                    value: expr[start..end].to_string(),
                    matched: vec![expr[i..end].to_string(), expr[start..end].to_string()],
                    params: None,
                }),
                at,
            ));
            i = end;
            expect_operand = false;
            continue;
        }

        if b == b'[' && !expect_operand {
            let (close, slice) = find_key_end(bytes, i)
                .ok_or_else(|| TokenizeError::new("Unclosed '['", at))?;
            if slice {
                return Err(TokenizeError::new("Slice keys are not supported", at));
            }
            let inner = &expr[i + 1..close];
            let stack = compile_expression(inner, at + 1)?;
            if stack.is_empty() {
                return Err(TokenizeError::new("Empty key", at));
            }
            lexemes.push((
                Lexeme::Operand(ExprToken::Brackets {
                    stack,
                    params: None,
                }),
                at,
            ));
            i = close + 1;
            continue;
        }

        if let Some((op, ..)) = OPERATORS
            .iter()
            .find(|(op, ..)| {
                !op.starts_with(|c: char| c.is_ascii_alphabetic()) && expr[i..].starts_with(*op)
            })
        {
            if expect_operand {
                return Err(TokenizeError::new(
                    format!("Unsupported unary operator '{}'", op),
                    at,
                ));
            }
            lexemes.push((Lexeme::Operator { op: *op, unary: false }, at));
            i += op.len();
            expect_operand = true;
            continue;
        }

        if let Some((bracket, opening)) = Bracket::of(b) {
            if opening {
                brackets.push((bracket, at));
                lexemes.push((Lexeme::Open(bracket), at));
                expect_operand = true;
            } else {
                match brackets.pop() {
                    Some((open, _)) if open == bracket => {}
                    _ => {
                        return Err(TokenizeError::new(
                            format!("Unexpected '{}'", bracket.close_char()),
                            at,
                        ))
                    }
                }
                lexemes.push((Lexeme::Close(bracket), at));
                expect_operand = false;
            }
            i += 1;
            continue;
        }

        if b == b',' {
            lexemes.push((Lexeme::Comma, at));
            expect_operand = true;
            i += 1;
            continue;
        }

        let ch = expr[i..].chars().next().unwrap_or('?');
        return Err(TokenizeError::new(
            format!("Unexpected character '{}'", ch),
            at,
        ));
    }

    if let Some((open, at)) = brackets.pop() {
        return Err(TokenizeError::new(
            format!("Unclosed '{}'", open.open_char()),
            at,
        ));
    }

    Ok(lexemes)
}

/// `is [not] name` after an operand; `from` points just past `is`.
fn lex_test(expr: &str, from: usize, at: usize) -> Result<(Lexeme, usize), TokenizeError> {
    let bytes = expr.as_bytes();
    let mut start = skip_whitespace(bytes, from);
    let mut end = scan_word(bytes, start);
    let mut modifier = None;
    if &expr[start..end] == "not" {
        modifier = Some("not".to_string());
        start = skip_whitespace(bytes, end);
        end = scan_word(bytes, start);
    }
    if start == end {
        return Err(TokenizeError::new("Missing test name after 'is'", at));
    }
    let token = ExprToken::Test {
        filter: expr[start..end].to_string(),
        modifier,
        params: None,
    };
    Ok((Lexeme::Operand(token), end))
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION COMPILING
// ═══════════════════════════════════════════════════════════════════════════════

enum Pending {
    Operator(ExprToken),
    Open(Bracket),
}

/// Compile a Twig expression into the runtime's postfix stack.
///
/// Operators are reordered by precedence; bracketed arguments are folded into
/// the function, filter or test they follow.
pub fn compile_expression(expr: &str, offset: usize) -> Result<Vec<ExprToken>, TokenizeError> {
    let mut output: Vec<ExprToken> = Vec::new();
    let mut stack: Vec<Pending> = Vec::new();

    for (lexeme, at) in lex_expression(expr, offset)? {
        match lexeme {
            Lexeme::Operand(token) => output.push(token),
            Lexeme::Operator { op, unary } => {
                push_operator(&mut output, &mut stack, op, unary, at)?
            }
            Lexeme::Open(bracket) => {
                output.push(bracket.start_token());
                stack.push(Pending::Open(bracket));
            }
            Lexeme::Close(Bracket::Paren) => close_params(&mut output, &mut stack, at)?,
            Lexeme::Close(bracket) => {
                loop {
                    match stack.pop() {
                        Some(Pending::Operator(token)) => output.push(token),
                        Some(Pending::Open(open)) if open == bracket => break,
                        _ => {
                            return Err(TokenizeError::new(
                                format!("Unexpected '{}'", bracket.close_char()),
                                at,
                            ))
                        }
                    }
                }
                output.push(bracket.end_token());
            }
            Lexeme::Comma => {
                loop {
                    match stack.last() {
                        Some(Pending::Open(_)) => break,
                        Some(Pending::Operator(_)) => {
                            if let Some(Pending::Operator(token)) = stack.pop() {
                                output.push(token);
                            }
                        }
                        None => return Err(TokenizeError::new("Unexpected ','", at)),
                    }
                }
                output.push(ExprToken::Comma);
            }
        }
    }

    while let Some(pending) = stack.pop() {
        match pending {
            Pending::Operator(token) => output.push(token),
            Pending::Open(bracket) => {
                return Err(TokenizeError::new(
                    format!("Unclosed '{}'", bracket.open_char()),
                    offset,
                ))
            }
        }
    }

    Ok(output)
}

fn push_operator(
    output: &mut Vec<ExprToken>,
    stack: &mut Vec<Pending>,
    op: &'static str,
    unary: bool,
    at: usize,
) -> Result<(), TokenizeError> {
    let (precidence, associativity) =
        lookup(op).ok_or_else(|| TokenizeError::new(format!("Unknown operator '{}'", op), at))?;
    let mut operator = Operator {
        value: op.to_string(),
        precidence,
        associativity,
        operator: op.to_string(),
        key: None,
        params: None,
    };

    while let Some(Pending::Operator(top)) = stack.last() {
        let Some(top) = top.operator() else { break };
        let yields = match associativity {
            Associativity::LeftToRight => precidence >= top.precidence,
            Associativity::RightToLeft => precidence > top.precidence,
        };
        if !yields {
            break;
        }
        if let Some(Pending::Operator(token)) = stack.pop() {
            output.push(token);
        }
    }

    if op == ":" {
        let ternary = matches!(
            stack.last(),
            Some(Pending::Operator(top)) if top.operator().map_or(false, |t| t.value == "?")
        );
        if !ternary {
            // hash entry: the key moves onto the operator
            match output.pop() {
                Some(ExprToken::String { value }) | Some(ExprToken::Variable { value, .. }) => {
                    operator.key = Some(value)
                }
                Some(ExprToken::Number { value, .. }) => operator.key = Some(value.to_string()),
                Some(ExprToken::ParamEnd {
                    expression: true,
                    params,
                    ..
                }) => operator.params = params,
                _ => return Err(TokenizeError::new("Unexpected value before ':'", at)),
            }
            output.push(ExprToken::Binary(operator));
            return Ok(());
        }
    }

    stack.push(Pending::Operator(if unary {
        ExprToken::Unary(operator)
    } else {
        ExprToken::Binary(operator)
    }));
    Ok(())
}

fn close_params(
    output: &mut Vec<ExprToken>,
    stack: &mut Vec<Pending>,
    at: usize,
) -> Result<(), TokenizeError> {
    loop {
        match stack.pop() {
            Some(Pending::Operator(token)) => output.push(token),
            Some(Pending::Open(Bracket::Paren)) => break,
            _ => return Err(TokenizeError::new("Unexpected ')'", at)),
        }
    }

    let start = output
        .iter()
        .rposition(|token| matches!(token, ExprToken::ParamStart { .. }))
        .ok_or_else(|| TokenizeError::new("Unexpected ')'", at))?;
    let mut params = output.split_off(start);

    match output.last_mut() {
        Some(ExprToken::Function { params: slot, .. })
        | Some(ExprToken::Filter { params: slot, .. })
        | Some(ExprToken::Test { params: slot, .. })
        | Some(ExprToken::Period { params: slot, .. })
        | Some(ExprToken::Brackets { params: slot, .. }) => {
            params.push(Bracket::Paren.end_token());
            *slot = Some(params);
        }
        _ => {
            // grouping parentheses
            params.remove(0);
            output.push(ExprToken::ParamEnd {
                value: ")".to_string(),
                matched: vec![")".to_string()],
                expression: true,
                params: Some(params),
            });
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TAG COMPILING
// ═══════════════════════════════════════════════════════════════════════════════

fn compile_tag(
    name: &str,
    args: &str,
    args_offset: usize,
    offset: usize,
) -> Result<LogicToken, TokenizeError> {
    let invalid = || TokenizeError::new(format!("Invalid '{}' tag", name), offset);
    let compile_at = |m: Match| compile_expression(m.as_str(), args_offset + m.start());
    let required = || {
        if args.is_empty() {
            Err(invalid())
        } else {
            compile_expression(args, args_offset)
        }
    };

    let token = match name {
        "if" => LogicToken::If {
            stack: required()?,
            output: vec![],
        },
        "elseif" => LogicToken::ElseIf {
            stack: required()?,
            output: vec![],
        },
        "else" if args.is_empty() => LogicToken::Else {
            matched: vec!["else".to_string()],
            output: vec![],
        },
        "for" => {
            let caps = FOR_RE.captures(args).ok_or_else(invalid)?;
            let vars: Vec<&str> = caps[1].split(',').map(str::trim).collect();
            let (key_var, value_var) = match vars.as_slice() {
                [value] => (None, value.to_string()),
                [key, value] => (Some(key.to_string()), value.to_string()),
                _ => return Err(invalid()),
            };
            let conditional = caps.get(3).map(compile_at).transpose()?;
            LogicToken::For {
                key_var,
                value_var,
                expression: caps.get(2).map(compile_at).transpose()?.unwrap_or_default(),
                conditional,
                output: vec![],
            }
        }
        "set" => match SET_RE.captures(args) {
            Some(caps) => LogicToken::Set {
                key: caps[1].trim().to_string(),
                expression: caps.get(2).map(compile_at).transpose()?.unwrap_or_default(),
            },
            None if SET_CAPTURE_RE.is_match(args) => LogicToken::SetCapture {
                key: args.to_string(),
                output: vec![],
            },
            None => return Err(invalid()),
        },
        "block" => {
            let caps = BLOCK_RE.captures(args).ok_or_else(invalid)?;
            let block_name = caps[1].to_string();
            match caps.get(2) {
                Some(body) => LogicToken::ShortBlock {
                    expression: body.as_str().to_string(),
                    output: compile_at(body)?,
                    block_name,
                },
                None => LogicToken::Block {
                    block_name,
                    output: vec![],
                },
            }
        }
        "filter" => {
            if args.is_empty() {
                return Err(invalid());
            }
            LogicToken::Filter {
                stack: compile_expression(&format!("|{}", args), args_offset.saturating_sub(1))?,
                output: vec![],
            }
        }
        "spaceless" if args.is_empty() => LogicToken::Spaceless {
            matched: vec!["spaceless".to_string()],
            output: vec![],
        },
        "macro" => {
            let caps = MACRO_RE.captures(args).ok_or_else(invalid)?;
            let mut parameters = Vec::new();
            let mut defaults = IndexMap::new();
            if let Some(list) = caps.get(2) {
                let mut at = list.start();
                for raw in list.as_str().split(',') {
                    let (param, default) = match raw.split_once('=') {
                        Some((param, default)) => (param.trim(), Some(default)),
                        None => (raw.trim(), None),
                    };
                    if !param.is_empty() {
                        if !IDENT_RE.is_match(param) {
                            return Err(invalid());
                        }
                        if let Some(default) = default {
                            let default_at = at + raw.len() - default.len();
                            defaults.insert(
                                param.to_string(),
                                compile_expression(default, args_offset + default_at)?,
                            );
                        }
                        parameters.push(param.to_string());
                    }
                    at += raw.len() + 1;
                }
            }
            LogicToken::Macro {
                macro_name: caps[1].to_string(),
                parameters,
                defaults,
                output: vec![],
            }
        }
        "import" => {
            let caps = IMPORT_RE.captures(args).ok_or_else(invalid)?;
            LogicToken::Import {
                expression: caps[1].trim().to_string(),
                context_name: caps[2].to_string(),
                stack: caps.get(1).map(compile_at).transpose()?.unwrap_or_default(),
            }
        }
        "from" => {
            let caps = FROM_RE.captures(args).ok_or_else(invalid)?;
            let mut macro_names = IndexMap::new();
            for entry in caps[2].split(',').map(str::trim).filter(|e| !e.is_empty()) {
                match ALIAS_RE.captures(entry) {
                    Some(alias) => macro_names.insert(alias[1].to_string(), alias[2].to_string()),
                    None if IDENT_RE.is_match(entry) => {
                        macro_names.insert(entry.to_string(), entry.to_string())
                    }
                    None => return Err(invalid()),
                };
            }
            LogicToken::From {
                expression: caps[1].trim().to_string(),
                macro_names,
                stack: caps.get(1).map(compile_at).transpose()?.unwrap_or_default(),
            }
        }
        "use" => LogicToken::Use { stack: required()? },
        "extends" => LogicToken::Extends { stack: required()? },
        "include" | "embed" => {
            let caps = INCLUDE_RE.captures(args).ok_or_else(invalid)?;
            let only = caps.get(4).is_some();
            let ignore_missing = caps.get(2).is_some();
            let stack = caps.get(1).map(compile_at).transpose()?.unwrap_or_default();
            let with_stack = caps.get(3).map(compile_at).transpose()?;
            if name == "include" {
                LogicToken::Include {
                    only,
                    ignore_missing,
                    stack,
                    with_stack,
                }
            } else {
                LogicToken::Embed {
                    only,
                    ignore_missing,
                    stack,
                    with_stack,
                    output: vec![],
                }
            }
        }
        "with" => {
            let (context, only) = match args.strip_suffix("only") {
                Some(rest) if rest.is_empty() || rest.ends_with(char::is_whitespace) => {
                    (rest.trim_end(), true)
                }
                _ => (args, false),
            };
            let with_stack = if context.is_empty() {
                None
            } else {
                Some(compile_expression(context, args_offset)?)
            };
            LogicToken::With {
                only,
                with_stack,
                output: vec![],
            }
        }
        _ => {
            return Err(TokenizeError::new(
                format!("Unable to parse tag '{}'", name),
                offset,
            ))
        }
    };

    Ok(token)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE BUILDING
// ═══════════════════════════════════════════════════════════════════════════════

struct OpenBlock {
    token: LogicToken,
    end: &'static str,
    intermediates: &'static [&'static str],
    offset: usize,
}

fn build_tree(items: Vec<Item>) -> Result<Vec<Token>, TokenizeError> {
    let mut root: Vec<Token> = Vec::new();
    let mut open: Vec<OpenBlock> = Vec::new();

    fn sink<'a>(root: &'a mut Vec<Token>, open: &'a mut [OpenBlock]) -> &'a mut Vec<Token> {
        match open.last_mut().and_then(|block| block.token.body_mut()) {
            Some(body) => body,
            None => root,
        }
    }

    fn close(root: &mut Vec<Token>, open: &mut Vec<OpenBlock>) {
        if let Some(done) = open.pop() {
            sink(root, open).push(Token::Logic { token: done.token });
        }
    }

    for item in items {
        match item {
            Item::Raw(value) => sink(&mut root, &mut open).push(Token::Raw { value }),
            Item::Output { stack } => sink(&mut root, &mut open).push(Token::Output { stack }),
            Item::Tag {
                name,
                args,
                args_offset,
                offset,
            } => {
                if let Some(current) = open.last() {
                    if current.end == name {
                        close(&mut root, &mut open);
                        continue;
                    }
                    if current.intermediates.contains(&name.as_str()) {
                        let end = current.end;
                        let token = compile_tag(&name, &args, args_offset, offset)?;
                        let intermediates = match &token {
                            LogicToken::ElseIf { .. } => IF_BRANCHES,
                            _ => NO_BRANCHES,
                        };
                        close(&mut root, &mut open);
                        open.push(OpenBlock {
                            token,
                            end,
                            intermediates,
                            offset,
                        });
                        continue;
                    }
                }

                if is_closing_tag(&name) {
                    let message = match open.last() {
                        Some(current) => format!(
                            "Unexpected '{}', expected '{}'",
                            name, current.end
                        ),
                        None => format!("Unexpected '{}' with no open block", name),
                    };
                    return Err(TokenizeError::new(message, offset));
                }

                let token = compile_tag(&name, &args, args_offset, offset)?;
                match token.closing() {
                    Some((end, intermediates)) => open.push(OpenBlock {
                        token,
                        end,
                        intermediates,
                        offset,
                    }),
                    None => sink(&mut root, &mut open).push(Token::Logic { token }),
                }
            }
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(TokenizeError::new(
            format!(
                "Unclosed '{}' block, expected '{}'",
                unclosed.token.tag(),
                unclosed.end
            ),
            unclosed.offset,
        ));
    }

    Ok(root)
}

fn is_closing_tag(name: &str) -> bool {
    name == "else" || name == "elseif" || END_TAGS.contains(&name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT TOKENIZER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
pub struct TwigTokenizer;

impl Tokenizer for TwigTokenizer {
    type Tree = TokenTree;

    fn tokenize(&self, id: &str, source: &str) -> Result<TokenTree, TokenizeError> {
        let items = lex(source)?;
        let tokens = build_tree(items)?;
        trace!(id, tokens = tokens.len(), "tokenized template");
        Ok(TokenTree(tokens))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
