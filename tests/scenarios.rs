use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use specimen::context::{Assignment, GenerationContext};
use specimen::error::{BuildError, GenerationError};
use specimen::random::derive_seed;
use specimen::{Model, RecordSpec, Selector, ShapeRegistry, TypeRef, Value};

fn catalog() -> Arc<ShapeRegistry> {
    let mut registry = ShapeRegistry::new();
    registry
        .define_record(RecordSpec::new("Tagged").field("id", "i64").field("tags", "List<String>"))
        .unwrap()
        .define_record(RecordSpec::new("Plain").field("id", "i64").field("name", "String").field("active", "bool"))
        .unwrap()
        .define_record(RecordSpec::new("Chain").field("label", "String").field("next", "Chain"))
        .unwrap()
        .define_record(RecordSpec::new("Address").field("city", "String").field("zip", "String"))
        .unwrap()
        .define_record(
            RecordSpec::new("Order")
                .field("copy", "i64")
                .field("total", "i64")
                .field("billing", "Address")
                .field("shipping", "Address"),
        )
        .unwrap()
        .define_record(RecordSpec::new("Flag").field("on", "bool"))
        .unwrap()
        .define_record(RecordSpec::new("Flags").field("items", "List<Flag>"))
        .unwrap()
        .define_record(RecordSpec::new("Toggles").field("by_flag", "Map<bool, String>"))
        .unwrap()
        .define_record(RecordSpec::new("Item").param("T").field("value", "T"))
        .unwrap()
        .define_record(RecordSpec::new("Page").param("T").field("items", "List<T>").field("total", "u32"))
        .unwrap()
        .define_record(RecordSpec::new("Animal").field("name", "String"))
        .unwrap()
        .define_record(RecordSpec::new("Dog").extends("Animal").field("good", "bool"))
        .unwrap()
        .define_record(RecordSpec::new("Zoo").field("star", "Animal"))
        .unwrap()
        .define_leaf("Email", |random: &mut specimen::Random| {
            Value::from(format!("{}@example.com", random.alphabetic_string(3, 3).to_lowercase()))
        })
        .unwrap()
        .define_record(RecordSpec::new("Contact").field("email", "Email"))
        .unwrap()
        .define_record(RecordSpec::new("Place").field("addr", "Address"))
        .unwrap()
        .define_record(RecordSpec::new("Commute").field("home", "Place").field("work", "Place"))
        .unwrap()
        .define_record(
            RecordSpec::new("Bins")
                .field("xs", "List<i64>")
                .field("by_name", "Map<String, i64>"),
        )
        .unwrap()
        .define_record(RecordSpec::new("Matrix").param("T").field("cells", "T[]").field("boxes", "Item<T>[]"))
        .unwrap();
    Arc::new(registry)
}

fn model(root: &str, context: GenerationContext) -> Model {
    Model::new(catalog(), TypeRef::parse(root).unwrap(), context).unwrap()
}

fn chain_length(value: &Value) -> usize {
    let mut links = 0;
    let mut current = value;
    while let Some(next) = current.field("next").filter(|v| !v.is_null()) {
        links += 1;
        current = next;
    }
    links
}

#[test]
fn seeded_tags_are_stable() {
    let context = || {
        GenerationContext::builder()
            .with_seed(42)
            .setting("min_size", "2")
            .setting("max_size", "2")
            .setting("nullable_default", "false")
            .build()
            .unwrap()
    };
    let first = model("Tagged", context()).generate().unwrap();
    let second = model("Tagged", context()).generate().unwrap();
    let tags = first.value.field("tags").and_then(Value::items).unwrap();
    assert_eq!(tags.len(), 2);
    assert!(tags.iter().all(|tag| !tag.is_null()));
    assert_eq!(first, second);
    assert_eq!(first.seed, 42);
}

#[test]
fn set_field_holds_for_every_seed() {
    let model = model("Tagged", GenerationContext::builder().set(Selector::field("id"), 7).build().unwrap());
    for seed in 1..=25 {
        let generated = model.generate_with_seed(seed).unwrap();
        assert_eq!(generated.value.field("id"), Some(&Value::Int(7)));
    }
}

#[test]
fn blank_mode_draws_nothing() {
    let generated = model("Plain", GenerationContext::builder().blank().with_seed(9).build().unwrap())
        .generate()
        .unwrap();
    let Value::Record(record) = &generated.value else { panic!("record expected") };
    assert_eq!(record.fields.len(), 3);
    assert!(record.fields.iter().all(|(_, value)| value.is_null()));
    assert_eq!(generated.draws, 0);
}

#[test]
fn blank_mode_still_applies_overrides() {
    let generated = model(
        "Plain",
        GenerationContext::builder().blank().set(Selector::field("name"), "KEPT").build().unwrap(),
    )
    .generate()
    .unwrap();
    assert_eq!(generated.value.field("name"), Some(&Value::from("KEPT")));
    assert_eq!(generated.value.field("id"), Some(&Value::Null));
}

#[test]
fn different_seeds_differ() {
    let model = model("Tagged", GenerationContext::builder().build().unwrap());
    let a = model.generate_with_seed(1).unwrap();
    let b = model.generate_with_seed(2).unwrap();
    assert_ne!(a.value, b.value);
}

#[test]
fn recursive_chain_respects_max_depth() {
    for depth in 0..5 {
        let generated = model("Chain", GenerationContext::builder().with_seed(3).with_max_depth(depth).build().unwrap())
            .generate()
            .unwrap();
        assert!(chain_length(&generated.value) <= depth, "depth {depth}");
    }
}

#[test]
fn empty_sizes_give_empty_sequences() {
    let context = GenerationContext::builder()
        .with_seed(11)
        .setting("min_size", "0")
        .setting("max_size", "0")
        .build()
        .unwrap();
    let generated = model("Tagged", context).generate().unwrap();
    assert_eq!(generated.value.field("tags"), Some(&Value::Seq(Vec::new())));
}

#[test]
fn small_key_space_gives_smaller_map() {
    let context = GenerationContext::builder()
        .with_seed(8)
        .setting("min_size", "5")
        .setting("max_size", "5")
        .build()
        .unwrap();
    let generated = model("Toggles", context).generate().unwrap();
    let entries = generated.value.field("by_flag").and_then(Value::entries).unwrap();
    assert!(entries.len() <= 2);
    assert!(!entries.is_empty());
}

#[test]
fn ignore_outranks_broader_and_equal_selectors() {
    let context = GenerationContext::builder()
        .with_seed(5)
        .set(Selector::shape("String").unwrap(), "X")
        .ignore(Selector::field("name"))
        .build()
        .unwrap();
    let generated = model("Plain", context).generate().unwrap();
    assert_eq!(generated.value.field("name"), Some(&Value::Null));

    let context = GenerationContext::builder()
        .with_seed(5)
        .ignore(Selector::field("name"))
        .set(Selector::field("name"), "LATE")
        .build()
        .unwrap();
    let generated = model("Plain", context).generate().unwrap();
    assert_eq!(generated.value.field("name"), Some(&Value::Null));
}

#[test]
fn more_specific_selector_wins() {
    let context = GenerationContext::builder()
        .with_seed(5)
        .set(Selector::field_of("Address", "city"), "ANY")
        .set(Selector::field("city").within(Selector::field("billing")), "BILL")
        .build()
        .unwrap();
    let generated = model("Order", context).generate().unwrap();
    let city = |field: &str| generated.value.field(field).and_then(|a| a.field("city")).cloned();
    assert_eq!(city("billing"), Some(Value::from("BILL")));
    assert_eq!(city("shipping"), Some(Value::from("ANY")));
}

#[test]
fn assignment_produces_origin_first() {
    let context = GenerationContext::builder()
        .with_seed(21)
        .assign(
            Selector::field("copy"),
            Assignment::of(Selector::field("total")).transform(|v| Value::from(v.as_i64().unwrap_or(0) * 2)),
        )
        .assign(
            Selector::field("city").within(Selector::field("shipping")),
            Assignment::of(Selector::field("city").within(Selector::field("billing"))),
        )
        .build()
        .unwrap();
    let model = model("Order", context);
    for seed in [1, 2, 3] {
        let value = model.generate_with_seed(seed).unwrap().value;
        let total = value.field("total").and_then(Value::as_i64).unwrap();
        assert_eq!(value.field("copy").and_then(Value::as_i64), Some(total * 2));
        assert_eq!(
            value.field("shipping").and_then(|a| a.field("city")),
            value.field("billing").and_then(|a| a.field("city"))
        );
    }
}

#[test]
fn rejected_condition_falls_back_to_default() {
    let context = GenerationContext::builder()
        .with_seed(4)
        .assign(
            Selector::field("copy"),
            Assignment::of(Selector::field("total"))
                .when(|v| v.as_i64().is_some_and(|x| x > 1_000_000))
                .transform(|_| Value::from(-1)),
        )
        .build()
        .unwrap();
    let value = model("Order", context).generate().unwrap().value;
    let copy = value.field("copy").and_then(Value::as_i64).unwrap();
    assert!((1..=10_000).contains(&copy));
}

#[test]
fn assignment_cycles_are_errors() {
    let context = GenerationContext::builder()
        .assign(Selector::field("copy"), Assignment::of(Selector::field("total")))
        .assign(Selector::field("total"), Assignment::of(Selector::field("copy")))
        .build()
        .unwrap();
    let err = model("Order", context).generate().unwrap_err();
    assert!(matches!(err, GenerationError::AssignmentCycle { .. }));
}

#[test]
fn assignment_without_origin_fails_the_build() {
    let context = GenerationContext::builder()
        .assign(Selector::field("copy"), Assignment::of(Selector::field("missing")))
        .build()
        .unwrap();
    let err = Model::new(catalog(), TypeRef::named("Order"), context).unwrap_err();
    assert!(matches!(err, BuildError::AssignmentOrigin { .. }));
}

#[test]
fn unique_retry_exhaustion_is_fatal() {
    let context = GenerationContext::builder()
        .with_seed(2)
        .setting("min_size", "5")
        .setting("max_size", "5")
        .setting("unique_retry_limit", "10")
        .unique(Selector::field("on"))
        .build()
        .unwrap();
    let err = model("Flags", context).generate().unwrap_err();
    assert!(matches!(err, GenerationError::UniqueRetryExhausted { attempts: 10, .. }));
}

#[test]
fn unmatched_selectors_depend_on_policy() {
    let strict = GenerationContext::builder()
        .with_seed(1)
        .set(Selector::field("nowhere"), 1)
        .build()
        .unwrap();
    match model("Plain", strict).generate() {
        Err(GenerationError::UnmatchedSelectors { selectors, generated }) => {
            assert_eq!(selectors.len(), 1);
            assert!(selectors[0].contains("nowhere"));
            assert_eq!(generated.len(), 1);
            assert!(generated[0].value.field("id").is_some());
        }
        other => panic!("unexpected {other:?}"),
    }

    let lenient = GenerationContext::builder()
        .with_seed(1)
        .set(Selector::field("nowhere"), 1)
        .lenient()
        .build()
        .unwrap();
    assert!(model("Plain", lenient).generate().is_ok());

    let per_selector = GenerationContext::builder()
        .with_seed(1)
        .set(Selector::field("nowhere").lenient(), 1)
        .build()
        .unwrap();
    assert!(model("Plain", per_selector).generate().is_ok());
}

#[test]
fn selectors_below_ignored_nodes_are_not_unmatched() {
    let context = GenerationContext::builder()
        .with_seed(1)
        .ignore(Selector::field("billing"))
        .set(Selector::field("zip").within(Selector::field("billing")), "00000")
        .build()
        .unwrap();
    let value = model("Order", context).generate().unwrap().value;
    assert_eq!(value.field("billing"), Some(&Value::Null));
}

#[test]
fn sequences_of_instances_chain_seeds() {
    let model = model("Tagged", GenerationContext::builder().with_seed(42).build().unwrap());
    let sequential = model.generate_many(4).unwrap();
    let seeds: Vec<u64> = sequential.iter().map(|g| g.seed).collect();
    assert_eq!(seeds[0], 42);
    for pair in seeds.windows(2) {
        assert_eq!(pair[1], derive_seed(pair[0]));
    }
    assert_eq!(model.generate_many_parallel(4).unwrap(), sequential);
    assert_eq!(model.generate_with_seed(seeds[2]).unwrap(), sequential[2]);
}

#[test]
fn generic_roots_resolve_through_nesting() {
    let generated = model("Page<Item<String>>", GenerationContext::builder().with_seed(6).build().unwrap())
        .generate()
        .unwrap();
    let items = generated.value.field("items").and_then(Value::items).unwrap();
    assert!(!items.is_empty());
    for item in items {
        assert!(item.field("value").and_then(Value::as_str).is_some());
    }

    let via_context = Model::new(
        catalog(),
        TypeRef::named("Page"),
        GenerationContext::builder()
            .with_seed(6)
            .root_type_arguments([TypeRef::parse("Item<String>").unwrap()])
            .build()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(via_context.generate().unwrap(), generated);
}

#[test]
fn unbound_root_parameters_are_unresolved() {
    let err = Model::new(catalog(), TypeRef::named("Page"), GenerationContext::default()).unwrap_err();
    assert!(matches!(err, BuildError::Unresolved(ref e) if e.argument == "T"));
}

#[test]
fn subtypes_are_generated_in_place() {
    let context = GenerationContext::builder()
        .with_seed(7)
        .subtype(Selector::field("star"), TypeRef::named("Dog"))
        .build()
        .unwrap();
    let value = model("Zoo", context).generate().unwrap().value;
    let Some(Value::Record(star)) = value.field("star") else { panic!("record expected") };
    assert_eq!(star.shape, "Dog");
    assert!(star.get("good").is_some());
    assert!(star.get("name").is_some());
}

#[test]
fn nullable_positions_but_never_the_root() {
    let context = GenerationContext::builder()
        .with_seed(7)
        .setting("null_probability", "1")
        .nullable(Selector::root())
        .nullable(Selector::field("name"))
        .build()
        .unwrap();
    let value = model("Plain", context).generate().unwrap().value;
    assert!(!value.is_null());
    assert_eq!(value.field("name"), Some(&Value::Null));
    assert!(value.field("id").is_some_and(|v| !v.is_null()));
}

#[test]
fn external_leaves_use_registered_generators() {
    let value = model("Contact", GenerationContext::builder().with_seed(1).build().unwrap())
        .generate()
        .unwrap()
        .value;
    let email = value.field("email").and_then(Value::as_str).unwrap();
    assert!(email.ends_with("@example.com"));
}

#[test]
fn generators_and_suppliers_override_defaults() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let context = GenerationContext::builder()
        .with_seed(1)
        .supply(Selector::field("name"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from("SUPPLIED")
        })
        .generate(Selector::field("id"), specimen::generators::IntRange { min: 500, max: 600 })
        .build()
        .unwrap();
    let value = model("Plain", context).generate().unwrap().value;
    assert_eq!(value.field("name"), Some(&Value::from("SUPPLIED")));
    assert!((500..=600).contains(&value.field("id").and_then(Value::as_i64).unwrap()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn user_generators_are_not_called_beyond_max_depth() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let context = GenerationContext::builder()
        .with_seed(1)
        .with_max_depth(2)
        .supply(Selector::field("label"), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Value::from("L")
        })
        .build()
        .unwrap();
    model("Chain", context).generate().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn nested_within_stays_in_its_branch() {
    let context = GenerationContext::builder()
        .with_seed(11)
        .set(Selector::field("city").within(Selector::field("addr").within(Selector::field("home"))), "HOME")
        .build()
        .unwrap();
    let commute = model("Commute", context).generate().unwrap().value;
    let city = |place: &str| commute.field(place).and_then(|p| p.field("addr")).and_then(|a| a.field("city")).cloned();
    assert_eq!(city("home"), Some(Value::from("HOME")));
    assert_ne!(city("work"), Some(Value::from("HOME")));
    assert!(city("work").is_some_and(|c| !c.is_null()));
}

#[test]
fn set_model_applies_a_prepared_context_to_a_subtree() {
    let oslo = GenerationContext::builder().set(Selector::field("city"), "Oslo").build().unwrap();
    let zip_only = GenerationContext::builder()
        .set(Selector::field("zip"), "Z")
        .blank()
        .build()
        .unwrap();
    let context = GenerationContext::builder()
        .with_seed(4)
        .set_model(Selector::field("billing"), &oslo)
        .set_model(Selector::field("shipping"), &zip_only)
        .build()
        .unwrap();
    let order = model("Order", context).generate().unwrap().value;
    let billing = order.field("billing").unwrap();
    let shipping = order.field("shipping").unwrap();
    assert_eq!(billing.field("city"), Some(&Value::from("Oslo")));
    assert!(billing.field("zip").is_some_and(|zip| !zip.is_null()));
    assert_eq!(shipping.field("city"), Some(&Value::Null));
    assert_eq!(shipping.field("zip"), Some(&Value::from("Z")));
    assert!(order.field("total").is_some_and(|total| !total.is_null()));
}

#[test]
fn stream_follows_the_generate_many_seed_chain() {
    let model = model("Tagged", GenerationContext::builder().with_seed(7).build().unwrap());
    let streamed: Vec<_> = model.stream().take(3).collect::<Result<_, _>>().unwrap();
    assert_eq!(streamed, model.generate_many(3).unwrap());
    assert_eq!(streamed[1].seed, derive_seed(7));
    assert_eq!(model.stream().nth(10).unwrap().unwrap().seed, (0..10).fold(7, |seed, _| derive_seed(seed)));
}

#[test]
fn elements_keys_and_values_are_nullable_on_their_own() {
    let context = |key: &str| {
        GenerationContext::builder()
            .with_seed(21)
            .setting("min_size", "3")
            .setting("max_size", "3")
            .setting("null_probability", "1")
            .setting(key, "true")
            .build()
            .unwrap()
    };

    let bins = model("Bins", context("nullable_elements")).generate().unwrap().value;
    assert_eq!(bins.field("xs"), Some(&Value::Seq(vec![Value::Null; 3])));
    let entries = bins.field("by_name").and_then(Value::entries).unwrap();
    assert!(entries.iter().all(|(k, v)| !k.is_null() && !v.is_null()));

    let bins = model("Bins", context("nullable_map_values")).generate().unwrap().value;
    assert!(bins.field("xs").and_then(Value::items).unwrap().iter().all(|x| !x.is_null()));
    let entries = bins.field("by_name").and_then(Value::entries).unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|(k, v)| !k.is_null() && v.is_null()));

    let bins = model("Bins", context("nullable_map_keys")).generate().unwrap().value;
    let entries = bins.field("by_name").and_then(Value::entries).unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.is_null() && !entries[0].1.is_null());
}

#[test]
fn blank_subtree_keeps_its_overrides() {
    let context = GenerationContext::builder()
        .with_seed(8)
        .blank_at(Selector::field("billing"))
        .set(Selector::field("zip").within(Selector::field("billing")), "Z")
        .build()
        .unwrap();
    let order = model("Order", context).generate().unwrap().value;
    let billing = order.field("billing").unwrap();
    assert_eq!(billing.field("city"), Some(&Value::Null));
    assert_eq!(billing.field("zip"), Some(&Value::from("Z")));
    let shipping = order.field("shipping").unwrap();
    assert!(shipping.field("city").is_some_and(|city| !city.is_null()));
    assert!(order.field("total").is_some_and(|total| !total.is_null()));
}

#[test]
fn arrays_of_type_variables_resolve_through_the_root() {
    let context = GenerationContext::builder()
        .with_seed(2)
        .setting("min_size", "2")
        .setting("max_size", "2")
        .build()
        .unwrap();
    let matrix = model("Matrix<i32>", context).generate().unwrap().value;
    let cells = matrix.field("cells").and_then(Value::items).unwrap();
    assert_eq!(cells.len(), 2);
    assert!(cells.iter().all(|cell| matches!(cell, Value::Int(_))));
    let boxes = matrix.field("boxes").and_then(Value::items).unwrap();
    assert!(boxes.iter().all(|b| matches!(b.field("value"), Some(Value::Int(_)))));
    assert!(matches!(matrix.field("cells"), Some(Value::Array(_))));
}
