//! Loan engine formulas.
//!
//! A loan taken in round `r` has principal
//! `starting_loan + (r - 1) * loan_increase`. Repaid in round `p`, it costs
//! `amount + (p - r) * floor(amount * loan_interest / 100)`. Both values are
//! frozen on the record when it is created.

use merchant_types::{GameData, Loan};

use crate::GameError;

/// Principal of a loan taken in `round`.
///
/// # Errors
///
/// Returns [`GameError::Overflow`] if the amount does not fit in an `i64`.
pub fn loan_amount(game: &GameData, round: u32) -> Result<i64, GameError> {
    let steps = i64::from(round.saturating_sub(1));
    steps
        .checked_mul(game.loan_increase)
        .and_then(|increase| game.starting_loan.checked_add(increase))
        .ok_or(GameError::Overflow("loan amount"))
}

/// Interest accrued per elapsed round on `amount`.
///
/// # Errors
///
/// Returns [`GameError::Overflow`] if the product does not fit in an `i64`.
pub fn interest_per_round(amount: i64, loan_interest: i64) -> Result<i64, GameError> {
    amount
        .checked_mul(loan_interest)
        .and_then(|scaled| scaled.checked_div_euclid(100))
        .ok_or(GameError::Overflow("loan interest"))
}

/// Amount due to repay `loan` in `payback_round`.
///
/// Repaying in the round the loan was taken costs exactly the principal.
/// A payback round before the loan round accrues no interest.
///
/// # Errors
///
/// Returns [`GameError::Overflow`] if the amount does not fit in an `i64`.
pub fn payback_amount(loan: &Loan, loan_interest: i64, payback_round: u32) -> Result<i64, GameError> {
    let rounds = i64::from(payback_round.saturating_sub(loan.round));
    let per_round = interest_per_round(loan.amount, loan_interest)?;
    rounds
        .checked_mul(per_round)
        .and_then(|interest| loan.amount.checked_add(interest))
        .ok_or(GameError::Overflow("payback amount"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use merchant_types::{LoanId, PlayerCode};

    use super::*;

    fn game() -> GameData {
        GameData {
            starting_time: Utc::now(),
            round_duration: 15,
            starting_loan: 500,
            loan_increase: 100,
            loan_interest: 10,
        }
    }

    fn loan(round: u32, amount: i64) -> Loan {
        Loan {
            id: LoanId::new(),
            player: PlayerCode::new("123456"),
            round,
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn loan_amount_grows_each_round() {
        let game = game();
        assert_eq!(loan_amount(&game, 1).unwrap(), 500);
        assert_eq!(loan_amount(&game, 2).unwrap(), 600);
        assert_eq!(loan_amount(&game, 6).unwrap(), 1000);
    }

    #[test]
    fn same_round_payback_is_principal() {
        assert_eq!(payback_amount(&loan(3, 700), 10, 3).unwrap(), 700);
    }

    #[test]
    fn payback_accrues_floored_interest_per_round() {
        // floor(650 * 15 / 100) = 97
        assert_eq!(payback_amount(&loan(1, 650), 15, 3).unwrap(), 650 + 2 * 97);
        assert_eq!(payback_amount(&loan(2, 600), 10, 6).unwrap(), 600 + 4 * 60);
    }

    #[test]
    fn payback_before_loan_round_accrues_nothing() {
        assert_eq!(payback_amount(&loan(4, 800), 10, 2).unwrap(), 800);
    }

    #[test]
    fn overflow_is_reported() {
        let mut game = game();
        game.loan_increase = i64::MAX;
        assert_eq!(
            loan_amount(&game, 3),
            Err(GameError::Overflow("loan amount"))
        );
    }
}
