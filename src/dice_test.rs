use rand::SeedableRng;
use rand::rngs::StdRng;

use super::*;

fn roll_many(formula: &str) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..500)
        .map(|_| DiceRoller::evaluate_with(formula, &mut rng).unwrap())
        .collect()
}

fn within(values: &[i64], lo: i64, hi: i64) -> bool {
    values.iter().all(|v| (lo..=hi).contains(v))
}

#[test]
fn constant_formula() {
    assert_eq!(DiceRoller::evaluate("42").unwrap(), 42);
    assert_eq!(DiceRoller::evaluate(" 10 + 5 - 3 ").unwrap(), 12);
}

#[test]
fn arithmetic_precedence_and_parentheses() {
    assert_eq!(DiceRoller::evaluate("2+3*4").unwrap(), 14);
    assert_eq!(DiceRoller::evaluate("(2+3)*4").unwrap(), 20);
    assert_eq!(DiceRoller::evaluate("-3+10").unwrap(), 7);
}

#[test]
fn dice_with_modifier_stays_in_range() {
    let values = roll_many("2d6+3");
    assert!(within(&values, 5, 15));
    assert!(values.iter().any(|v| *v != values[0]), "expected variation");
}

#[test]
fn bare_d_means_one_die() {
    assert!(within(&roll_many("d20"), 1, 20));
    assert!(within(&roll_many("D4"), 1, 4));
}

#[test]
fn keep_highest_and_lowest() {
    assert!(within(&roll_many("4d6kh3"), 3, 18));
    assert!(within(&roll_many("2d20kl1"), 1, 20));
}

#[test]
fn keep_highest_of_one_sided_dice_is_exact() {
    assert_eq!(DiceRoller::evaluate("5d1kh2").unwrap(), 2);
}

#[test]
fn grouped_dice_are_multiplied() {
    assert!(within(&roll_many("(1d4+1)*2"), 4, 10));
}

#[test]
fn empty_formula_is_rejected() {
    assert_eq!(DiceRoller::evaluate("   "), Err(FormulaError::Empty));
}

#[test]
fn garbage_is_rejected_with_position() {
    match DiceRoller::evaluate("2d6+abc") {
        Err(FormulaError::Unexpected { pos, .. }) => assert_eq!(pos, 4),
        other => panic!("expected unexpected-token error, got {other:?}"),
    }
    assert!(DiceRoller::evaluate("(1d6").is_err());
    assert!(DiceRoller::evaluate("3d").is_err());
    assert!(DiceRoller::evaluate("1d6)").is_err());
}

#[test]
fn out_of_range_dice_are_rejected() {
    assert!(matches!(DiceRoller::evaluate("0d6"), Err(FormulaError::OutOfRange(_))));
    assert!(matches!(DiceRoller::evaluate("1d0"), Err(FormulaError::OutOfRange(_))));
    assert!(matches!(DiceRoller::evaluate("5000d6"), Err(FormulaError::OutOfRange(_))));
    assert!(matches!(DiceRoller::evaluate("2d6kh3"), Err(FormulaError::OutOfRange(_))));
}

#[test]
fn deep_nesting_is_rejected_without_recursing() {
    let parens = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
    assert!(matches!(DiceRoller::evaluate(&parens), Err(FormulaError::OutOfRange(_))));
    let negations = format!("{}5", "-".repeat(100_000));
    assert!(matches!(DiceRoller::evaluate(&negations), Err(FormulaError::OutOfRange(_))));
}

#[test]
fn moderate_nesting_still_evaluates() {
    let formula = format!("{}2{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
    assert_eq!(DiceRoller::evaluate(&formula), Ok(2));
    assert_eq!(DiceRoller::evaluate("--3"), Ok(3));
}

#[test]
fn overflow_is_reported() {
    assert_eq!(DiceRoller::evaluate("99999999999999999999"), Err(FormulaError::Overflow));
}

#[tokio::test]
async fn roller_trait_delegates_to_evaluator() {
    let roller = DiceRoller;
    assert_eq!(roller.roll("7").await.unwrap(), 7);
    assert!(roller.roll("").await.is_err());
}
