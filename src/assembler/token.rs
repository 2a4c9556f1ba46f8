//! Tokens and a tokenizer for the assembly source format.
//!
//! A source line is a sequence of whitespace-separated words. Each word is
//! classified on its own: mnemonics and register names are exact matches,
//! everything else is decided by its leading character (`*` dereference,
//! `!`/`>` definitions, `@`/`<` uses, `0`/`1` binary literals).

use logos::{Lexer, Logos};

use std::fmt;

use crate::error::{CompileError, CompileErrorKind};
use crate::instruction::{OperandKind, Register, MNEMONICS};

/// Reason a word failed to lex. Converted into a [CompileErrorKind] with
/// the offending word filled in from the source line.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexicalError {
    /// The word matches no token class.
    #[default]
    UnknownToken,
    /// A `*`-prefixed word whose remainder is not a register name.
    DereferenceNotRegister,
    /// A binary literal with more than 16 digits.
    OversizedLiteral(usize),
    /// A `0`/`1`-leading word with non-binary characters.
    MalformedLiteral,
}

impl LexicalError {
    fn into_kind(self, word: &str) -> CompileErrorKind {
        match self {
            LexicalError::UnknownToken => CompileErrorKind::UnknownToken(word.to_string()),
            LexicalError::DereferenceNotRegister => CompileErrorKind::DereferenceNotRegister,
            LexicalError::OversizedLiteral(bits) => CompileErrorKind::OversizedLiteral(bits),
            LexicalError::MalformedLiteral => CompileErrorKind::MalformedLiteral,
        }
    }
}

/// Enumeration of all tokens of the assembly source format.
#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(error = LexicalError)]
#[logos(skip r"[ \t]+")]
pub enum Token {
    /// An instruction mnemonic, before overload resolution.
    #[regex(r"[^ \t]+", word_callback, priority = 1)]
    Action(String),

    /// A register named as an operand.
    #[regex(r"r[0-7]|ip|sp|cr", register_callback, priority = 5)]
    Register(Register),

    /// A register whose value is used as a memory address. (`*sp`)
    #[regex(r"\*[^ \t]*", dereference_callback, priority = 3)]
    Dereferenced(Register),

    /// A binary literal of at most 16 digits, most significant first.
    #[regex(r"[01][^ \t]*", literal_callback, priority = 3)]
    Literal(u16),

    /// A label use. (`@loop`)
    #[regex(r"@[^ \t]*", name_callback, priority = 3)]
    Label(String),

    /// A procedure use. (`<print`)
    #[regex(r"<[^ \t]*", name_callback, priority = 3)]
    Procedure(String),

    /// A label definition. (`!loop`)
    #[regex(r"![^ \t]*", name_callback, priority = 3)]
    LabelDefinition(String),

    /// A procedure definition. (`>print`)
    #[regex(r">[^ \t]*", name_callback, priority = 3)]
    ProcedureDefinition(String),
}

fn word_callback(lex: &mut Lexer<Token>) -> Result<String, LexicalError> {
    let word = lex.slice();

    if MNEMONICS.contains(word) {
        Ok(word.to_string())
    } else {
        Err(LexicalError::UnknownToken)
    }
}

fn register_callback(lex: &mut Lexer<Token>) -> Result<Register, LexicalError> {
    lex.slice().parse().map_err(|_| LexicalError::UnknownToken)
}

fn dereference_callback(lex: &mut Lexer<Token>) -> Result<Register, LexicalError> {
    lex.slice()[1..]
        .parse()
        .map_err(|_| LexicalError::DereferenceNotRegister)
}

fn literal_callback(lex: &mut Lexer<Token>) -> Result<u16, LexicalError> {
    let word = lex.slice();

    if word.len() > 16 {
        return Err(LexicalError::OversizedLiteral(word.len()));
    }

    u16::from_str_radix(word, 2).map_err(|_| LexicalError::MalformedLiteral)
}

fn name_callback(lex: &mut Lexer<Token>) -> String {
    lex.slice()[1..].to_string()
}

impl Token {
    /// The operand category of the token, or `None` for tokens that cannot
    /// appear as operands.
    pub fn operand_kind(&self) -> Option<OperandKind> {
        match self {
            Token::Register(_) => Some(OperandKind::Register),
            Token::Dereferenced(_) => Some(OperandKind::Dereferenced),
            Token::Literal(_) => Some(OperandKind::Literal),
            Token::Label(_) => Some(OperandKind::Label),
            Token::Procedure(_) => Some(OperandKind::Procedure),
            Token::Action(_) | Token::LabelDefinition(_) | Token::ProcedureDefinition(_) => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Action(mnemonic) => write!(f, "{}", mnemonic),
            Token::Register(register) => write!(f, "{}", register),
            Token::Dereferenced(register) => write!(f, "*{}", register),
            Token::Literal(value) => write!(f, "{:b}", value),
            Token::Label(name) => write!(f, "@{}", name),
            Token::Procedure(name) => write!(f, "<{}", name),
            Token::LabelDefinition(name) => write!(f, "!{}", name),
            Token::ProcedureDefinition(name) => write!(f, ">{}", name),
        }
    }
}

/// Tokenizes one trimmed source line.
///
/// An empty line or a comment line (leading `#`) yields no tokens. Every
/// word that fails to lex contributes its own error; the whole line is
/// scanned regardless so the full error set is reported at once.
pub fn tokenize_line(line: &str, line_number: usize) -> Result<Vec<Token>, Vec<CompileError>> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, span) in Token::lexer(line).spanned() {
        match result {
            Ok(token) => tokens.push(token),
            Err(error) => {
                let kind = error.into_kind(&line[span]);
                errors.push(CompileError::new(line_number, kind));
            }
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
