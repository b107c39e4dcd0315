use serde::Serialize;

use crate::env::Env;

/// Parser metadata carried alongside a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataAttribs {
    /// Source range `[start, end)` in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsr: Option<(usize, usize)>,
    /// Original wikitext, when it differs from what the token would serialize to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kv {
    pub k: String,
    pub v: String,
}

impl Kv {
    pub fn new(k: impl Into<String>, v: impl Into<String>) -> Self {
        Self {
            k: k.into(),
            v: v.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagToken {
    pub name: String,
    pub attribs: Vec<Kv>,
    pub data_attribs: DataAttribs,
}

impl TagToken {
    pub fn new(name: impl Into<String>, attribs: Vec<Kv>, data_attribs: DataAttribs) -> Self {
        Self {
            name: name.into(),
            attribs,
            data_attribs,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attribs
            .iter()
            .find(|kv| kv.k == key)
            .map(|kv| kv.v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Token {
    Tag(TagToken),
    EndTag(TagToken),
    SelfClosing(TagToken),
    Text { value: String },
    Newline(DataAttribs),
    Comment { value: String },
    Eof,
}

impl Token {
    pub fn tag(&self) -> Option<&TagToken> {
        match self {
            Self::Tag(tag) | Self::EndTag(tag) | Self::SelfClosing(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag().map(|tag| tag.name.as_str())
    }
}

/// What a handler made of one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    /// The token, possibly untouched.
    Token(Token),
    /// Zero or more tokens spliced in place of the input.
    Tokens(Vec<Token>),
}

pub trait TokenHandler {
    fn on_tag(&self, token: Token, env: &mut Env<'_>) -> HandlerResult;
}

/// Run `handler` once over every tag token, splicing its output into the stream.
pub fn transform_tokens(
    tokens: Vec<Token>,
    handler: &dyn TokenHandler,
    env: &mut Env<'_>,
) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.tag().is_none() {
            out.push(token);
            continue;
        }
        match handler.on_tag(token, env) {
            HandlerResult::Token(token) => out.push(token),
            HandlerResult::Tokens(tokens) => out.extend(tokens),
        }
    }
    out
}
