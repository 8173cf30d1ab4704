//! Built-in dice-formula evaluator.
//!
//! Supports integer constants, dice terms (`d20`, `3d8`, `4d6kh3`, `2d20kl1`),
//! `+`, `-`, `*`, and parentheses. Whitespace is ignored. Hosts with their own
//! dice engine can supply a different `FormulaRoller` instead.

#[cfg(test)]
#[path = "dice_test.rs"]
mod dice_test;

use rand::Rng;

use crate::collab::FormulaRoller;
use crate::error::FormulaError;

const MAX_DICE: i64 = 1000;
const MAX_SIDES: i64 = 10_000;
/// Deepest run of parentheses and unary minus accepted.
const MAX_NESTING: usize = 64;

/// Dice roller backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiceRoller;

impl DiceRoller {
    /// Evaluate a formula with the thread-local RNG.
    ///
    /// # Errors
    ///
    /// Returns a `FormulaError` on malformed input or out-of-range dice.
    pub fn evaluate(formula: &str) -> Result<i64, FormulaError> {
        Self::evaluate_with(formula, &mut rand::rng())
    }

    /// Evaluate a formula with a caller-supplied RNG.
    ///
    /// # Errors
    ///
    /// Returns a `FormulaError` on malformed input or out-of-range dice.
    pub fn evaluate_with<R: Rng + ?Sized>(formula: &str, rng: &mut R) -> Result<i64, FormulaError> {
        let compact: Vec<u8> = formula
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .map(|b| b.to_ascii_lowercase())
            .collect();
        if compact.is_empty() {
            return Err(FormulaError::Empty);
        }
        let mut parser = Parser { src: &compact, pos: 0, depth: 0, rng };
        let value = parser.expr()?;
        if parser.pos < compact.len() {
            return Err(parser.unexpected());
        }
        Ok(value)
    }
}

#[async_trait::async_trait]
impl FormulaRoller for DiceRoller {
    async fn roll(&self, formula: &str) -> Result<i64, FormulaError> {
        Self::evaluate(formula)
    }
}

// =============================================================================
// PARSER
// =============================================================================

struct Parser<'a, R: Rng + ?Sized> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
    rng: &'a mut R,
}

impl<R: Rng + ?Sized> Parser<'_, R> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn unexpected(&self) -> FormulaError {
        let found = self.peek().map_or_else(|| "end of input".to_string(), |b| char::from(b).to_string());
        FormulaError::Unexpected { found, pos: self.pos }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<i64, FormulaError>) -> Result<i64, FormulaError> {
        if self.depth >= MAX_NESTING {
            return Err(FormulaError::OutOfRange(format!("nesting deeper than {MAX_NESTING}")));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn expr(&mut self) -> Result<i64, FormulaError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    value = value.checked_add(self.term()?).ok_or(FormulaError::Overflow)?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    value = value.checked_sub(self.term()?).ok_or(FormulaError::Overflow)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<i64, FormulaError> {
        let mut value = self.unary()?;
        while self.peek() == Some(b'*') {
            self.pos += 1;
            value = value.checked_mul(self.unary()?).ok_or(FormulaError::Overflow)?;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<i64, FormulaError> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
            return self.nested(Self::unary)?.checked_neg().ok_or(FormulaError::Overflow);
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<i64, FormulaError> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.nested(Self::expr)?;
                if self.peek() != Some(b')') {
                    return Err(self.unexpected());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(b'd') => self.dice(1),
            Some(b) if b.is_ascii_digit() => {
                let n = self.number()?;
                if self.peek() == Some(b'd') { self.dice(n) } else { Ok(n) }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn number(&mut self) -> Result<i64, FormulaError> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.unexpected());
        }
        let mut value: i64 = 0;
        for b in &self.src[start..self.pos] {
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(b - b'0')))
                .ok_or(FormulaError::Overflow)?;
        }
        Ok(value)
    }

    /// Parse `d<sides>[kh<n>|kl<n>]` after the count and roll it.
    fn dice(&mut self, count: i64) -> Result<i64, FormulaError> {
        self.pos += 1;
        let sides = self.number()?;
        if !(1..=MAX_DICE).contains(&count) || !(1..=MAX_SIDES).contains(&sides) {
            return Err(FormulaError::OutOfRange(format!("{count}d{sides}")));
        }

        let keep = if self.src[self.pos..].starts_with(b"kh") {
            self.pos += 2;
            Some((true, self.number()?))
        } else if self.src[self.pos..].starts_with(b"kl") {
            self.pos += 2;
            Some((false, self.number()?))
        } else {
            None
        };

        let mut rolls: Vec<i64> = (0..count).map(|_| self.rng.random_range(1..=sides)).collect();
        if let Some((highest, n)) = keep {
            if !(1..=count).contains(&n) {
                return Err(FormulaError::OutOfRange(format!("keep {n} of {count}")));
            }
            rolls.sort_unstable();
            if highest {
                rolls.reverse();
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            rolls.truncate(n as usize);
        }
        Ok(rolls.iter().sum())
    }
}
