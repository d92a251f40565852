// src/models/loyalty.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Cartão fidelidade: um por (negócio, cliente).
// Em repouso vale sempre 0 <= current_stamps < stamps_required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyCard {
    pub id: Uuid,
    #[schema(ignore)]
    pub business_id: Uuid,
    pub customer_id: Uuid,
    #[schema(example = 3)]
    pub current_stamps: i32,
    #[schema(example = 5)]
    pub stamps_required: i32,
    pub total_visits: i32,
    pub rewards_redeemed: i32,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl LoyaltyCard {
    /// Cartão novo, criado na primeira visita concluída.
    pub fn fresh(business_id: Uuid, customer_id: Uuid, stamps_required: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            business_id,
            customer_id,
            current_stamps: 0,
            stamps_required: stamps_required.max(1),
            total_visits: 0,
            rewards_redeemed: 0,
            last_visit_at: None,
            created_at: now,
        }
    }

    /// Registra uma visita: carimba, e se completou o cartão converte em
    /// recompensa e zera. Retorna o novo estado e se houve recompensa.
    pub fn with_visit(&self, at: DateTime<Utc>) -> (LoyaltyCard, bool) {
        let mut next = self.clone();
        next.current_stamps += 1;
        next.total_visits += 1;
        next.last_visit_at = Some(at);
        let rewarded = next.fold_rewards();
        (next, rewarded)
    }

    /// Altera a meta do cartão. Se os carimbos atuais já atingem a nova
    /// meta, a recompensa é concedida na hora.
    pub fn with_stamps_required(&self, stamps_required: i32) -> (LoyaltyCard, bool) {
        let mut next = self.clone();
        next.stamps_required = stamps_required.max(1);
        let rewarded = next.fold_rewards();
        (next, rewarded)
    }

    fn fold_rewards(&mut self) -> bool {
        if self.current_stamps >= self.stamps_required {
            self.rewards_redeemed += 1;
            self.current_stamps = 0;
            return true;
        }
        false
    }
}

/// Resultado de uma visita registrada, com os dois retratos tirados sob o lock.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VisitOutcome {
    pub before: LoyaltyCard,
    pub after: LoyaltyCard,
    pub reward_earned: bool,
}

/// Regra de detecção de recompensa a partir dos retratos antes/depois.
pub fn reward_detected(before: &LoyaltyCard, after: &LoyaltyCard) -> bool {
    before.current_stamps + 1 >= before.stamps_required
        || after.rewards_redeemed > before.rewards_redeemed
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn card(required: i32) -> LoyaltyCard {
        LoyaltyCard::fresh(Uuid::new_v4(), Uuid::new_v4(), required, Utc::now())
    }

    #[rstest]
    #[case(5, 0)]
    #[case(5, 4)]
    #[case(5, 5)]
    #[case(5, 13)]
    #[case(3, 9)]
    #[case(1, 4)]
    fn n_visits_yield_floor_rewards_and_remainder_stamps(#[case] required: i32, #[case] visits: i32) {
        let mut current = card(required);
        for _ in 0..visits {
            current = current.with_visit(Utc::now()).0;
        }
        assert_eq!(current.rewards_redeemed, visits / required);
        assert_eq!(current.current_stamps, visits % required);
        assert_eq!(current.total_visits, visits);
        assert!(current.current_stamps < current.stamps_required);
    }

    #[test]
    fn fifth_stamp_resets_and_rewards() {
        let mut before = card(5);
        before.current_stamps = 4;
        let (after, rewarded) = before.with_visit(Utc::now());
        assert!(rewarded);
        assert_eq!(after.current_stamps, 0);
        assert_eq!(after.rewards_redeemed, 1);
        assert!(reward_detected(&before, &after));
    }

    #[test]
    fn ordinary_visit_is_not_a_reward() {
        let before = card(5);
        let (after, rewarded) = before.with_visit(Utc::now());
        assert!(!rewarded);
        assert!(!reward_detected(&before, &after));
    }

    #[test]
    fn lowering_the_target_folds_immediately() {
        let mut current = card(10);
        current.current_stamps = 6;
        let (after, rewarded) = current.with_stamps_required(5);
        assert!(rewarded);
        assert_eq!(after.current_stamps, 0);
        assert_eq!(after.rewards_redeemed, 1);
    }
}
