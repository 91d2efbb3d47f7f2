//! A small, closed interpreter for the JS function-literal transforms
//! found in unit descriptors (`value` / `valuePrepare`), per spec.md §9:
//! arithmetic, numeric methods (`toFixed`, `padStart`), a conditional
//! expression, template literals, and comparison against zero. Anything
//! outside this grammar is refused rather than guessed at — callers
//! treat a `None` result as `lookup-miss`, never as an error.
//!
//! Grounded on `examples/original_source/src/pybragerone/models/units.py`
//! and the `value`/`valuePrepare` fields documented in
//! `models/param_resolver.py`.

use std::iter::Peekable;
use std::str::Chars;

/// A transform's runtime value: JS's loose typing collapses to three
/// cases for the grammar we support.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Val {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(n) => Some(*n),
            Val::Str(s) => s.parse().ok(),
            Val::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        }
    }

    pub fn display(&self) -> String {
        match self {
            Val::Num(n) => {
                if n.fract() == 0.0 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Val::Str(s) => s.clone(),
            Val::Bool(b) => b.to_string(),
        }
    }
}

/// Parses an arrow-function source (`"e => Number((e*.1).toFixed(1))"`)
/// and evaluates it against `input`, returning `None` if the body uses
/// syntax outside the supported grammar.
pub fn apply_transform(source: &str, input: f64) -> Option<Val> {
    let (param, body) = source.split_once("=>")?;
    let param = param.trim().trim_matches(|c| c == '(' || c == ')').trim();
    if param.is_empty() {
        return None;
    }
    let mut parser = Parser::new(body.trim(), param, input);
    let value = parser.parse_expr()?;
    parser.skip_ws();
    if parser.chars.peek().is_some() {
        return None; // trailing garbage: body used syntax we don't model
    }
    Some(value)
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    rest: &'a str,
    pos: usize,
    param: &'a str,
    input: f64,
}

impl<'a> Parser<'a> {
    fn new(body: &'a str, param: &'a str, input: f64) -> Self {
        Parser {
            chars: body.chars().peekable(),
            rest: body,
            pos: 0,
            param,
            input,
        }
    }

    fn skip_ws(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn peek_str(&self) -> &str {
        &self.rest[self.pos..]
    }

    fn eat_token(&mut self, tok: &str) -> bool {
        self.skip_ws();
        if self.peek_str().starts_with(tok) {
            for _ in 0..tok.chars().count() {
                self.advance();
            }
            true
        } else {
            false
        }
    }

    // expr := ternary
    fn parse_expr(&mut self) -> Option<Val> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Option<Val> {
        let cond = self.parse_comparison()?;
        self.skip_ws();
        if self.eat_token("?") {
            let then_branch = self.parse_expr()?;
            if !self.eat_token(":") {
                return None;
            }
            let else_branch = self.parse_expr()?;
            let truthy = match &cond {
                Val::Bool(b) => *b,
                Val::Num(n) => *n != 0.0,
                Val::Str(s) => !s.is_empty(),
            };
            return Some(if truthy { then_branch } else { else_branch });
        }
        Some(cond)
    }

    fn parse_comparison(&mut self) -> Option<Val> {
        let lhs = self.parse_additive()?;
        self.skip_ws();
        const OPS: &[&str] = &[">=", "<=", "===", "==", "!==", "!=", ">", "<"];
        for op in OPS {
            if self.peek_str().starts_with(op) {
                for _ in 0..op.chars().count() {
                    self.advance();
                }
                let rhs = self.parse_additive()?;
                let a = lhs.as_num()?;
                let b = rhs.as_num()?;
                let result = match *op {
                    ">=" => a >= b,
                    "<=" => a <= b,
                    "==" | "===" => (a - b).abs() < f64::EPSILON,
                    "!=" | "!==" => (a - b).abs() >= f64::EPSILON,
                    ">" => a > b,
                    "<" => a < b,
                    _ => unreachable!(),
                };
                return Some(Val::Bool(result));
            }
        }
        Some(lhs)
    }

    fn parse_additive(&mut self) -> Option<Val> {
        let mut acc = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            if self.eat_token("+") {
                let rhs = self.parse_multiplicative()?;
                acc = match (&acc, &rhs) {
                    (Val::Str(_), _) | (_, Val::Str(_)) => Val::Str(format!("{}{}", acc.display(), rhs.display())),
                    _ => Val::Num(acc.as_num()? + rhs.as_num()?),
                };
            } else if self.eat_token("-") {
                let rhs = self.parse_multiplicative()?;
                acc = Val::Num(acc.as_num()? - rhs.as_num()?);
            } else {
                break;
            }
        }
        Some(acc)
    }

    fn parse_multiplicative(&mut self) -> Option<Val> {
        let mut acc = self.parse_unary()?;
        loop {
            self.skip_ws();
            if self.eat_token("*") {
                let rhs = self.parse_unary()?;
                acc = Val::Num(acc.as_num()? * rhs.as_num()?);
            } else if self.eat_token("/") {
                let rhs = self.parse_unary()?;
                acc = Val::Num(acc.as_num()? / rhs.as_num()?);
            } else if self.eat_token("%") {
                let rhs = self.parse_unary()?;
                acc = Val::Num(acc.as_num()? % rhs.as_num()?);
            } else {
                break;
            }
        }
        Some(acc)
    }

    fn parse_unary(&mut self) -> Option<Val> {
        self.skip_ws();
        if self.eat_token("-") {
            let v = self.parse_postfix()?;
            return Some(Val::Num(-v.as_num()?));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Val> {
        let mut value = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.eat_token(".") {
                let method = self.parse_ident()?;
                if !self.eat_token("(") {
                    return None;
                }
                let args = self.parse_args()?;
                if !self.eat_token(")") {
                    return None;
                }
                value = self.apply_method(&value, &method, &args)?;
            } else {
                break;
            }
        }
        Some(value)
    }

    fn apply_method(&self, receiver: &Val, method: &str, args: &[Val]) -> Option<Val> {
        match method {
            "toFixed" => {
                let digits = args.first().and_then(Val::as_num).unwrap_or(0.0) as usize;
                let n = receiver.as_num()?;
                Some(Val::Str(format!("{n:.digits$}")))
            }
            "padStart" => {
                let width = args.first().and_then(Val::as_num)? as usize;
                let pad = args.get(1).map(Val::display).unwrap_or_else(|| " ".to_string());
                let pad_char = pad.chars().next().unwrap_or(' ');
                let s = receiver.display();
                if s.chars().count() >= width {
                    Some(Val::Str(s))
                } else {
                    let mut padded: String = std::iter::repeat(pad_char).take(width - s.chars().count()).collect();
                    padded.push_str(&s);
                    Some(Val::Str(padded))
                }
            }
            "toString" => Some(Val::Str(receiver.display())),
            _ => None,
        }
    }

    fn parse_args(&mut self) -> Option<Vec<Val>> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek_str().starts_with(')') {
            return Some(args);
        }
        loop {
            args.push(self.parse_expr()?);
            self.skip_ws();
            if self.eat_token(",") {
                continue;
            }
            break;
        }
        Some(args)
    }

    fn parse_ident(&mut self) -> Option<String> {
        self.skip_ws();
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            None
        } else {
            Some(ident)
        }
    }

    fn parse_primary(&mut self) -> Option<Val> {
        self.skip_ws();
        if self.eat_token("(") {
            let v = self.parse_expr()?;
            if !self.eat_token(")") {
                return None;
            }
            return Some(v);
        }
        if self.peek_str().starts_with('"') || self.peek_str().starts_with('\'') {
            return self.parse_string();
        }
        if self.peek_str().starts_with('`') {
            return self.parse_template();
        }
        if let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                return self.parse_number();
            }
        }

        let ident = self.parse_ident()?;
        self.skip_ws();
        if self.eat_token("(") {
            let args = self.parse_args()?;
            if !self.eat_token(")") {
                return None;
            }
            return self.apply_function(&ident, &args);
        }
        if ident == self.param {
            return Some(Val::Num(self.input));
        }
        if ident == "Math" {
            // Math.<fn>(...) handled via the dotted-call path below.
            if self.eat_token(".") {
                let method = self.parse_ident()?;
                if !self.eat_token("(") {
                    return None;
                }
                let args = self.parse_args()?;
                if !self.eat_token(")") {
                    return None;
                }
                let n = args.first().and_then(Val::as_num)?;
                return Some(Val::Num(match method.as_str() {
                    "round" => n.round(),
                    "floor" => n.floor(),
                    "ceil" => n.ceil(),
                    "abs" => n.abs(),
                    _ => return None,
                }));
            }
        }
        None
    }

    fn apply_function(&self, name: &str, args: &[Val]) -> Option<Val> {
        match name {
            "Number" => Some(Val::Num(args.first()?.as_num()?)),
            "String" => Some(Val::Str(args.first()?.display())),
            "Boolean" => Some(Val::Bool(args.first()?.as_num().map(|n| n != 0.0).unwrap_or(false))),
            _ => None,
        }
    }

    fn parse_number(&mut self) -> Option<Val> {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '.' {
                s.push(c);
                self.advance();
            } else {
                break;
            }
        }
        s.parse::<f64>().ok().map(Val::Num)
    }

    fn parse_string(&mut self) -> Option<Val> {
        let quote = self.advance()?;
        let mut s = String::new();
        loop {
            let c = self.advance()?;
            if c == quote {
                break;
            }
            s.push(c);
        }
        Some(Val::Str(s))
    }

    fn parse_template(&mut self) -> Option<Val> {
        self.advance()?; // backtick
        let mut out = String::new();
        loop {
            let c = self.advance()?;
            if c == '`' {
                break;
            }
            if c == '$' && self.peek_str().starts_with('{') {
                self.advance(); // '{'
                let v = self.parse_expr()?;
                if !self.eat_token("}") {
                    return None;
                }
                out.push_str(&v.display());
            } else {
                out.push(c);
            }
        }
        Some(Val::Str(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_spec_example_transform() {
        let v = apply_transform("e => Number((e*.1).toFixed(1))", 53.0).unwrap();
        assert_eq!(v, Val::Num(5.3));
    }

    #[test]
    fn ternary_conditional() {
        let v = apply_transform("e => e > 0 ? e : 0", -5.0).unwrap();
        assert_eq!(v, Val::Num(0.0));
        let v = apply_transform("e => e > 0 ? e : 0", 5.0).unwrap();
        assert_eq!(v, Val::Num(5.0));
    }

    #[test]
    fn pad_start_on_stringified_number() {
        let v = apply_transform("e => String(e).padStart(2, \"0\")", 5.0).unwrap();
        assert_eq!(v, Val::Str("05".to_string()));
    }

    #[test]
    fn template_literal_interpolation() {
        let v = apply_transform("e => `${e}%`", 42.0).unwrap();
        assert_eq!(v, Val::Str("42%".to_string()));
    }

    #[test]
    fn refuses_unsupported_syntax() {
        assert!(apply_transform("e => someUnknownHelper(e)", 1.0).is_none());
    }

    #[test]
    fn math_round_is_supported() {
        let v = apply_transform("e => Math.round(e / 10)", 57.0).unwrap();
        assert_eq!(v, Val::Num(6.0));
    }
}
