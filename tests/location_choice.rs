use std::collections::HashSet;

use approx::assert_relative_eq;
use lcmrs::data::{Table, TableBuilder};
use lcmrs::{unit_choice, LcmError, LocationChoiceModel};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn labels(raw: &str) -> Vec<String> {
    raw.chars().map(String::from).collect()
}

/// Five choosers holding every other alternative.
fn choosers() -> Table {
    TableBuilder::range(5)
        .numeric("var1", (5..10).map(f64::from).collect())
        .text("thing_id", labels("acegi"))
        .build()
        .unwrap()
}

/// Ten alternatives keyed `a..j` on an index named `thing_id`.
fn alternatives() -> Table {
    TableBuilder::new(labels("abcdefghij"))
        .index_name("thing_id")
        .numeric("var2", (10..20).map(f64::from).collect())
        .numeric("var3", (20..30).map(f64::from).collect())
        .build()
        .unwrap()
}

fn current_choices() -> Vec<String> {
    choosers().text("thing_id").unwrap().to_vec()
}

fn fitted_model(rng: &mut SmallRng) -> LocationChoiceModel {
    let mut model = LocationChoiceModel::new(
        &["var1 != 9"],
        &["var3 != 15", "var2 != 14"],
        "var2 + var1:var3",
        5,
    )
    .unwrap();
    model
        .fit(&choosers(), &alternatives(), &current_choices(), rng)
        .unwrap();
    model
}

#[test]
fn unit_choice_keeps_chooser_order_and_draws_distinct_slots() {
    let choosers: Vec<String> = (0..5).map(|i| i.to_string()).collect();
    let alternatives = labels("abcdefghij");
    let mut rng = SmallRng::seed_from_u64(3);

    for _ in 0..50 {
        let assignment = unit_choice(&choosers, &alternatives, &[1.0; 10], &mut rng).unwrap();
        assert_eq!(assignment.choosers(), choosers.as_slice());
        let assigned: Vec<&str> = assignment.assigned().collect();
        assert_eq!(assigned.len(), 5);
        let distinct: HashSet<&str> = assigned.iter().copied().collect();
        assert_eq!(distinct.len(), 5);
        assert!(assigned.iter().all(|a| alternatives.iter().any(|k| k == a)));
    }
}

#[test]
fn unit_choice_respects_weights_and_capacity() {
    let choosers: Vec<String> = (0..5).map(|i| i.to_string()).collect();
    let alternatives = labels("abcdefghij");
    let mut rng = SmallRng::seed_from_u64(4);

    let selective = [0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0];
    let assignment = unit_choice(&choosers, &alternatives, &selective, &mut rng).unwrap();
    let mut assigned: Vec<&str> = assignment.assigned().collect();
    assigned.sort_unstable();
    assert_eq!(assigned, ["b", "d", "e", "g", "j"]);

    let shortfall = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
    let assignment = unit_choice(&choosers, &alternatives, &shortfall, &mut rng).unwrap();
    assert_eq!(assignment.unassigned_count(), 3);
    let mut assigned: Vec<&str> = assignment.assigned().collect();
    assigned.sort_unstable();
    assert_eq!(assigned, ["f", "h"]);

    let assignment = unit_choice(&choosers, &alternatives, &[0.0; 10], &mut rng).unwrap();
    assert_eq!(assignment.choosers(), choosers.as_slice());
    assert_eq!(assignment.unassigned_count(), 5);
}

#[test]
fn repeated_slots_are_each_used_once() {
    let choosers: Vec<String> = (0..6).map(|i| i.to_string()).collect();
    let alternatives = labels("aaabbc");
    let mut rng = SmallRng::seed_from_u64(5);
    let assignment = unit_choice(&choosers, &alternatives, &[1.0; 6], &mut rng).unwrap();
    let mut assigned: Vec<&str> = assignment.assigned().collect();
    assigned.sort_unstable();
    assert_eq!(assigned, ["a", "a", "a", "b", "b", "c"]);
}

#[test]
fn fit_then_predict_smoke() {
    let mut rng = SmallRng::seed_from_u64(8);
    let model = fitted_model(&mut rng);

    let loglik = model.log_likelihoods().unwrap();
    let stats = loglik.as_array();
    assert_eq!(stats.len(), 3);
    assert!(stats.iter().all(|value| value.is_finite()));
    assert!(loglik.converged >= loglik.null);
    assert_relative_eq!(loglik.null, -3.0 * 5f64.ln(), epsilon = 1e-12);

    let results = model.fit_results().unwrap();
    let collections = results.collections();
    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].0, "coefficients");
    assert_eq!(collections[1].0, "standard_errors");
    for (_, parameters) in collections {
        assert_eq!(parameters.names(), ["var2", "var1:var3"]);
    }
    // var1 == 9 is filtered out, and the chooser holding `e` loses its choice
    assert_eq!(model.fit_state().unwrap().choosers, 3);

    let assignment = model
        .predict(&choosers(), &alternatives(), &mut rng)
        .unwrap();
    assert_eq!(assignment.choosers(), choosers().index());
    let keys: HashSet<String> = labels("abcdefghij").into_iter().collect();
    for choice in assignment.choices().iter().flatten() {
        assert!(keys.contains(choice));
        assert_ne!(choice, "e", "filtered alternatives are never assigned");
    }
    let distinct: HashSet<&str> = assignment.assigned().collect();
    assert_eq!(distinct.len(), assignment.assigned().count());
}

#[test]
fn predict_over_repeated_alternatives_returns_original_keys() {
    let mut rng = SmallRng::seed_from_u64(9);
    let mut model = LocationChoiceModel::builder("var2 + var1:var3", 5)
        .chooser_filters(&["var1 != 9"])
        .alternative_filters(&["var3 != 15", "var2 != 14"])
        .choice_column("thing_id")
        .build()
        .unwrap();
    model
        .fit(&choosers(), &alternatives(), &current_choices(), &mut rng)
        .unwrap();

    let repeated = alternatives()
        .repeat(&[1, 2, 3, 2, 4, 3, 2, 1, 5, 8])
        .unwrap()
        .reset_index()
        .unwrap();
    assert_eq!(repeated.nrows(), 31);

    let probabilities = model.probabilities(&choosers(), &repeated).unwrap();
    // the four `e` rows are filtered out
    let (ids, probs) = probabilities.for_chooser("0").unwrap();
    assert_eq!(ids.len(), 27);
    assert_relative_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

    let assignment = model.predict(&choosers(), &repeated, &mut rng).unwrap();
    assert_eq!(assignment.len(), 5);
    assert_eq!(assignment.choosers(), choosers().index());
    let keys: HashSet<String> = labels("abcdefghij").into_iter().collect();
    for choice in assignment.choices().iter().flatten() {
        assert!(keys.contains(choice), "{choice} is not an original key");
    }
}

#[test]
fn repeated_row_keys_need_a_choice_column() {
    let mut rng = SmallRng::seed_from_u64(10);
    let model = fitted_model(&mut rng);
    let repeated = alternatives().repeat(&[2, 1, 1, 1, 1, 1, 1, 1, 1, 1]).unwrap();
    let result = model.predict(&choosers(), &repeated, &mut rng);
    assert!(matches!(
        result,
        Err(LcmError::AmbiguousAlternativeIdentity { key }) if key == "a"
    ));
}

#[test]
fn unknown_filter_column_is_reported_at_fit() {
    let mut rng = SmallRng::seed_from_u64(11);
    let mut model =
        LocationChoiceModel::new(&["var1 != 9"], &["missing > 0"], "var2", 5).unwrap();
    let result = model.fit(&choosers(), &alternatives(), &current_choices(), &mut rng);
    assert!(matches!(result, Err(LcmError::InvalidExpression { .. })));
    assert!(!model.is_fitted());
}

#[test]
fn fit_results_serialize_to_json() {
    let mut rng = SmallRng::seed_from_u64(12);
    let model = fitted_model(&mut rng);
    let state = model.fit_state().unwrap();
    let json = serde_json::to_value(state).unwrap();
    assert_eq!(json["formula"], "var2 + var1:var3");
    assert_eq!(json["alternative_filters"][1], "var2 != 14");
    assert!(json["results"]["coefficients"].is_object());
    assert!(json["log_likelihoods"]["rho_squared"].is_number());
}

#[test]
fn integer_choice_column_identifies_alternatives() {
    let building_ids: Vec<f64> = (0..10).map(|i| f64::from(100 + i)).collect();
    let alternatives = TableBuilder::range(10)
        .numeric("building_id", building_ids)
        .numeric("var2", (10..20).map(f64::from).collect())
        .numeric("var3", (20..30).map(f64::from).collect())
        .build()
        .unwrap();
    let current: Vec<String> = ["100", "102", "104", "106", "108"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rng = SmallRng::seed_from_u64(13);
    let mut model = LocationChoiceModel::builder("var2 + var1:var3", 5)
        .choice_column("building_id")
        .build()
        .unwrap();
    model
        .fit(&choosers(), &alternatives, &current, &mut rng)
        .unwrap();
    assert_eq!(model.fit_state().unwrap().choosers, 5);

    let units = alternatives.repeat(&[2; 10]).unwrap().reset_index().unwrap();
    let assignment = model.predict(&choosers(), &units, &mut rng).unwrap();
    assert_eq!(assignment.choosers(), choosers().index());
    let valid: HashSet<String> = (100..110).map(|i| i.to_string()).collect();
    for choice in assignment.choices().iter().flatten() {
        assert!(valid.contains(choice), "{choice} is not a building id");
    }
}
