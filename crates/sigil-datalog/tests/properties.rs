//! Property tests: canonical term ordering and fixpoint invariants.

use proptest::prelude::*;
use sigil_datalog::{
    Fact, Origin, Predicate, RunLimits, Rule, SymbolTable, Term, TrustedOrigins, World,
};
use std::cmp::Ordering;

fn term_strategy() -> impl Strategy<Value = Term> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Term::Integer),
        (0u64..64).prop_map(Term::Str),
        any::<u32>().prop_map(|d| Term::Date(d as u64)),
        proptest::collection::vec(any::<u8>(), 0..8).prop_map(Term::Bytes),
        any::<bool>().prop_map(Term::Bool),
        Just(Term::Null),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Term::Array),
            proptest::collection::btree_set(inner, 0..4).prop_map(Term::Set),
        ]
    })
}

proptest! {
    #[test]
    fn term_order_is_total_and_antisymmetric(a in term_strategy(), b in term_strategy()) {
        match a.cmp(&b) {
            Ordering::Less => prop_assert_eq!(b.cmp(&a), Ordering::Greater),
            Ordering::Greater => prop_assert_eq!(b.cmp(&a), Ordering::Less),
            Ordering::Equal => prop_assert_eq!(&a, &b),
        }
    }

    #[test]
    fn term_order_is_transitive(
        a in term_strategy(),
        b in term_strategy(),
        c in term_strategy(),
    ) {
        let mut sorted = vec![a, b, c];
        sorted.sort();
        prop_assert!(sorted[0] <= sorted[1] && sorted[1] <= sorted[2]);
        prop_assert!(sorted[0] <= sorted[2]);
    }
}

fn closure_world(
    edges: &[(i64, i64)],
    rule_order: &[usize],
) -> (World, SymbolTable, TrustedOrigins) {
    let mut symbols = SymbolTable::new();
    let edge = symbols.insert("edge");
    let reach = symbols.insert("reach");

    let base = Rule::new(
        Predicate::new(reach, vec![Term::Variable(0), Term::Variable(1)]),
        vec![Predicate::new(
            edge,
            vec![Term::Variable(0), Term::Variable(1)],
        )],
        vec![],
        vec![],
    );
    let step = Rule::new(
        Predicate::new(reach, vec![Term::Variable(0), Term::Variable(2)]),
        vec![
            Predicate::new(reach, vec![Term::Variable(0), Term::Variable(1)]),
            Predicate::new(edge, vec![Term::Variable(1), Term::Variable(2)]),
        ],
        vec![],
        vec![],
    );
    let rules = [base, step];
    let trusted: TrustedOrigins = [Origin::Authorizer].into_iter().collect();

    let mut world = World::new();
    for (a, b) in edges {
        world.add_fact(
            Origin::Authorizer,
            Fact::new(edge, vec![Term::Integer(*a), Term::Integer(*b)]),
        );
    }
    for index in rule_order {
        world.add_rule(Origin::Authorizer, trusted.clone(), rules[*index].clone());
    }
    (world, symbols, trusted)
}

proptest! {
    /// The saturated fact set does not depend on rule registration order.
    #[test]
    fn fixpoint_is_order_independent(
        edges in proptest::collection::vec((0i64..6, 0i64..6), 1..8),
    ) {
        let limits = RunLimits { max_facts: Some(10_000), max_iterations: Some(1_000) };

        let (mut forward, symbols, _) = closure_world(&edges, &[0, 1]);
        forward.run(&symbols, &limits).unwrap();

        let (mut backward, symbols_b, _) = closure_world(&edges, &[1, 0]);
        backward.run(&symbols_b, &limits).unwrap();

        prop_assert_eq!(forward.facts().len(), backward.facts().len());
        for (origin, fact) in forward.facts().iter() {
            prop_assert!(backward.facts().contains(origin, fact));
        }
    }

    /// Rule application is monotone: more input facts never remove output
    /// facts.
    #[test]
    fn fixpoint_is_monotone(
        edges in proptest::collection::vec((0i64..6, 0i64..6), 2..8),
        split in 1usize..7,
    ) {
        let limits = RunLimits { max_facts: Some(10_000), max_iterations: Some(1_000) };
        let split = split.min(edges.len() - 1);

        let (mut small, symbols_small, _) = closure_world(&edges[..split], &[0, 1]);
        small.run(&symbols_small, &limits).unwrap();

        let (mut large, symbols_large, _) = closure_world(&edges, &[0, 1]);
        large.run(&symbols_large, &limits).unwrap();

        for (origin, fact) in small.facts().iter() {
            prop_assert!(large.facts().contains(origin, fact));
        }
    }
}
