//! Pratt binding powers for the PeaQL expression grammar.

use crate::ast::{BinaryOp, UnaryOp};
use crate::lexer::{Keyword, TokenKind};

/// Binding power of the comparison tier.
///
/// BETWEEN operands are parsed at this power so the mandatory AND separator
/// is not swallowed as a conjunction.
pub const COMPARISON_BP: u8 = 8;

/// Returns the prefix binding power for a token, or `None` if the token
/// cannot start an expression.
#[must_use]
pub const fn prefix_binding_power(kind: &TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Minus => Some(13),
        TokenKind::Keyword(Keyword::Not) => Some(5),
        TokenKind::Integer(_)
        | TokenKind::Float(_)
        | TokenKind::String(_)
        | TokenKind::Identifier(_)
        | TokenKind::Quoted(..)
        | TokenKind::LeftParen
        | TokenKind::LeftBracket
        | TokenKind::Star
        | TokenKind::Placeholder
        | TokenKind::Colon => Some(0),
        TokenKind::Keyword(
            Keyword::Null | Keyword::True | Keyword::False | Keyword::Case | Keyword::Exists,
        ) => Some(0),
        _ => None,
    }
}

/// Returns `(left_bp, right_bp)` for an infix token; left-associative
/// operators have `left_bp < right_bp`.
#[must_use]
pub const fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
    match kind {
        TokenKind::Keyword(Keyword::Or) => Some((1, 2)),
        TokenKind::Keyword(Keyword::And) => Some((3, 4)),

        // Comparisons, pattern matches, membership and range tests all share
        // one non-chaining tier.
        TokenKind::Eq
        | TokenKind::NotEq
        | TokenKind::Lt
        | TokenKind::LtEq
        | TokenKind::Gt
        | TokenKind::GtEq
        | TokenKind::Tilde
        | TokenKind::TildeStar
        | TokenKind::NotTilde
        | TokenKind::NotTildeStar
        | TokenKind::QuestionTilde
        | TokenKind::QuestionTildeStar => Some((7, COMPARISON_BP)),
        TokenKind::Keyword(
            Keyword::Is | Keyword::In | Keyword::Between | Keyword::Like | Keyword::Not,
        ) => Some((7, COMPARISON_BP)),

        TokenKind::Plus | TokenKind::Minus | TokenKind::Concat => Some((9, 10)),
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some((11, 12)),

        _ => None,
    }
}

/// Returns the postfix binding power for a token (`.`, `[`, `::`).
#[must_use]
pub const fn postfix_binding_power(kind: &TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Dot | TokenKind::LeftBracket | TokenKind::DoubleColon => Some(15),
        _ => None,
    }
}

/// Converts a token to a plain binary operator.
#[must_use]
pub const fn token_to_binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Mod),
        TokenKind::Eq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::NotEq),
        TokenKind::Lt => Some(BinaryOp::Lt),
        TokenKind::LtEq => Some(BinaryOp::LtEq),
        TokenKind::Gt => Some(BinaryOp::Gt),
        TokenKind::GtEq => Some(BinaryOp::GtEq),
        TokenKind::Concat => Some(BinaryOp::Concat),
        TokenKind::Tilde => Some(BinaryOp::Match),
        TokenKind::TildeStar => Some(BinaryOp::MatchCi),
        TokenKind::NotTilde => Some(BinaryOp::NotMatch),
        TokenKind::NotTildeStar => Some(BinaryOp::NotMatchCi),
        TokenKind::QuestionTilde => Some(BinaryOp::MatchPrefixed),
        TokenKind::QuestionTildeStar => Some(BinaryOp::MatchPrefixedCi),
        TokenKind::Keyword(Keyword::And) => Some(BinaryOp::And),
        TokenKind::Keyword(Keyword::Or) => Some(BinaryOp::Or),
        TokenKind::Keyword(Keyword::Like) => Some(BinaryOp::Like),
        _ => None,
    }
}

/// Converts a token to a unary operator.
#[must_use]
pub const fn token_to_unary_op(kind: &TokenKind) -> Option<UnaryOp> {
    match kind {
        TokenKind::Minus => Some(UnaryOp::Neg),
        TokenKind::Keyword(Keyword::Not) => Some(UnaryOp::Not),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        let add = infix_binding_power(&TokenKind::Plus).unwrap();
        let mul = infix_binding_power(&TokenKind::Star).unwrap();
        let cmp = infix_binding_power(&TokenKind::Eq).unwrap();
        let and = infix_binding_power(&TokenKind::Keyword(Keyword::And)).unwrap();
        let or = infix_binding_power(&TokenKind::Keyword(Keyword::Or)).unwrap();
        assert!(mul.0 > add.0);
        assert!(add.0 > cmp.0);
        assert!(cmp.0 > and.0);
        assert!(and.0 > or.0);
    }

    #[test]
    fn test_regex_operators_sit_on_comparison_tier() {
        assert_eq!(
            infix_binding_power(&TokenKind::Tilde),
            infix_binding_power(&TokenKind::Eq)
        );
        assert_eq!(
            infix_binding_power(&TokenKind::QuestionTildeStar),
            infix_binding_power(&TokenKind::Eq)
        );
    }

    #[test]
    fn test_postfix_binds_tightest() {
        let postfix = postfix_binding_power(&TokenKind::DoubleColon).unwrap();
        let (_, mul_r) = infix_binding_power(&TokenKind::Star).unwrap();
        assert!(postfix > mul_r);
    }
}
