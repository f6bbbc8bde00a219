// Property-based tests for the decision rules
// Status aggregation and completion must hold for every attribute list, not just the sampled ones

use loan_review_workflow::workflows::LOAN_DECISION_NOT_SET;
use loan_review_workflow::{determine_status, evaluate, AttributeDecision, DecisionValue, LoanStatus};
use proptest::prelude::*;
use proptest::sample::Index;
use proptest_derive::Arbitrary;

#[derive(Debug, Clone, Arbitrary)]
struct Slot {
    #[proptest(strategy = "any_decision()")]
    decision: Option<DecisionValue>,
}

fn any_decision() -> impl Strategy<Value = Option<DecisionValue>> {
    prop_oneof![
        Just(None),
        Just(Some(DecisionValue::Pending)),
        Just(Some(DecisionValue::Approved)),
        Just(Some(DecisionValue::Rejected)),
        Just(Some(DecisionValue::Reclass)),
        Just(Some(DecisionValue::Repurchase)),
    ]
}

fn undecided() -> impl Strategy<Value = Option<DecisionValue>> {
    prop_oneof![Just(None), Just(Some(DecisionValue::Pending))]
}

fn without_repurchase() -> impl Strategy<Value = Option<DecisionValue>> {
    any_decision().prop_filter("no repurchase", |d| *d != Some(DecisionValue::Repurchase))
}

fn approved_or_undecided() -> impl Strategy<Value = Option<DecisionValue>> {
    prop_oneof![undecided(), Just(Some(DecisionValue::Approved))]
}

fn rejected_or_undecided() -> impl Strategy<Value = Option<DecisionValue>> {
    prop_oneof![undecided(), Just(Some(DecisionValue::Rejected))]
}

fn approved_rejected_or_undecided() -> impl Strategy<Value = Option<DecisionValue>> {
    prop_oneof![
        undecided(),
        Just(Some(DecisionValue::Approved)),
        Just(Some(DecisionValue::Rejected)),
    ]
}

fn attributes(decisions: Vec<Option<DecisionValue>>) -> Vec<AttributeDecision> {
    decisions
        .into_iter()
        .enumerate()
        .map(|(i, decision)| AttributeDecision::new(format!("Attr{}", i), decision))
        .collect()
}

fn with_inserted(
    mut decisions: Vec<Option<DecisionValue>>,
    at: Index,
    value: DecisionValue,
) -> Vec<Option<DecisionValue>> {
    let position = at.index(decisions.len() + 1);
    decisions.insert(position, Some(value));
    decisions
}

proptest! {
    #[test]
    fn any_repurchase_yields_repurchase(
        decisions in prop::collection::vec(any_decision(), 0..12),
        at in any::<Index>()
    ) {
        let list = attributes(with_inserted(decisions, at, DecisionValue::Repurchase));
        prop_assert_eq!(determine_status(&list), Ok(LoanStatus::Repurchase));
    }

    #[test]
    fn reclass_without_repurchase_yields_reclass_approved(
        decisions in prop::collection::vec(without_repurchase(), 0..12),
        at in any::<Index>()
    ) {
        let list = attributes(with_inserted(decisions, at, DecisionValue::Reclass));
        prop_assert_eq!(determine_status(&list), Ok(LoanStatus::ReclassApproved));
    }

    #[test]
    fn uniformly_approved_yields_approved(
        decisions in prop::collection::vec(approved_or_undecided(), 1..12)
    ) {
        prop_assert_eq!(determine_status(&attributes(decisions)), Ok(LoanStatus::Approved));
    }

    #[test]
    fn uniformly_rejected_yields_rejected(
        decisions in prop::collection::vec(rejected_or_undecided(), 0..12),
        at in any::<Index>()
    ) {
        let list = attributes(with_inserted(decisions, at, DecisionValue::Rejected));
        prop_assert_eq!(determine_status(&list), Ok(LoanStatus::Rejected));
    }

    #[test]
    fn approvals_mixed_with_rejections_yield_partial(
        decisions in prop::collection::vec(approved_rejected_or_undecided(), 0..12),
        approved_at in any::<Index>(),
        rejected_at in any::<Index>()
    ) {
        let decisions = with_inserted(decisions, approved_at, DecisionValue::Approved);
        let list = attributes(with_inserted(decisions, rejected_at, DecisionValue::Rejected));
        prop_assert_eq!(determine_status(&list), Ok(LoanStatus::PartiallyApproved));
    }

    #[test]
    fn pending_and_null_never_change_the_status(
        slots in prop::collection::vec(any::<Slot>(), 1..10),
        padding in prop::collection::vec(undecided(), 1..6)
    ) {
        let decisions: Vec<_> = slots.into_iter().map(|slot| slot.decision).collect();
        let base = determine_status(&attributes(decisions.clone()));

        let mut padded = decisions;
        padded.extend(padding);
        prop_assert_eq!(determine_status(&attributes(padded)), base);
    }

    #[test]
    fn completion_is_blocked_exactly_when_an_attribute_is_undecided(
        slots in prop::collection::vec(any::<Slot>(), 0..12)
    ) {
        let list = attributes(slots.into_iter().map(|slot| slot.decision).collect());
        let undecided_names: Vec<&str> = list
            .iter()
            .filter(|attr| attr.is_undecided())
            .map(|attr| attr.name.as_str())
            .collect();

        let outcome = evaluate(Some("Pending Review"), &list);
        prop_assert_eq!(outcome.is_complete, undecided_names.is_empty());

        if outcome.is_complete {
            prop_assert!(outcome.blocking_reasons.is_empty());
        } else {
            prop_assert_eq!(outcome.blocking_reasons.len(), 1);
            let (_, named) = outcome.blocking_reasons[0]
                .split_once(": ")
                .expect("reason lists the attributes");
            prop_assert_eq!(named.split(", ").collect::<Vec<_>>(), undecided_names);
        }
    }

    #[test]
    fn missing_overall_decision_is_reported_only_while_blocked(
        slots in prop::collection::vec(any::<Slot>(), 0..12)
    ) {
        let list = attributes(slots.into_iter().map(|slot| slot.decision).collect());
        let outcome = evaluate(None, &list);
        let reports_missing = outcome
            .blocking_reasons
            .iter()
            .any(|reason| reason == LOAN_DECISION_NOT_SET);
        prop_assert_eq!(reports_missing, !outcome.is_complete);
    }
}
