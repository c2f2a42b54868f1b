// Copyright (c) 2024-present, the extraction-tree authors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use extraction_tree::prefilter::Prefilter;
use extraction_tree::rules::spatial::{
    are_aligned, are_arranged, bottom_aligned_pair, left_to_right_pair, top_down_pair,
    AlignmentLine, Direction,
};
use extraction_tree::rules::textual::text_equals;
use extraction_tree::{
    extract, run_model, AnyPredicate, BBox, Config, Document, DocumentBuilder, EntityId,
    Extraction, Field, Interval, Predicate, Rule, ScoredExtraction,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use test_log::test;

const VOCABULARY: &[&str] = &["Total", "Net", "Gross", "Date", "Amount", "Tax"];

fn random_document(rng: &mut StdRng) -> Document {
    let mut builder = DocumentBuilder::new("random");
    builder.page(
        BBox::new(Interval::new(0.0, 100.0), Interval::new(0.0, 50.0)),
        1,
    );

    let words = rng.random_range(4..12);
    for _ in 0..words {
        let x = f64::from(rng.random_range(0..90));
        let y = f64::from(rng.random_range(0..49));
        let text = VOCABULARY[rng.random_range(0..VOCABULARY.len())];
        let bbox = BBox::new(Interval::new(x, x + 5.0), Interval::new(y, y + 1.0));
        let word = builder.word(bbox, text).expect("word is in page bounds");
        builder
            .text(&[word], Some(1.0), None)
            .expect("word list is non-empty");
    }

    builder.finish()
}

fn random_rules(rng: &mut StdRng) -> extraction_tree::Result<Vec<Rule>> {
    let fields = ["a", "b", "c"];
    let mut rules = Vec::new();

    let rule_count = rng.random_range(2..5);
    for _ in 0..rule_count {
        let f1 = fields[rng.random_range(0..fields.len())];
        let f2 = fields[(fields.iter().position(|f| *f == f1).unwrap_or(0) + 1) % fields.len()];

        let rule = match rng.random_range(0..4) {
            0 => text_equals(VOCABULARY[rng.random_range(0..VOCABULARY.len())])
                .applied_to(&[f1])?,
            1 => left_to_right_pair().applied_to(&[f1, f2])?,
            2 => top_down_pair().applied_to(&[f1, f2])?,
            _ => bottom_aligned_pair().applied_to(&[f1, f2])?,
        };
        rules.push(rule);
    }

    Ok(rules)
}

fn exhaust(doc: &Document, rules: Vec<Rule>) -> extraction_tree::Result<Vec<Rc<ScoredExtraction>>> {
    let results = run_model(
        doc,
        &extract(rules, None)?,
        &Config {
            num_samples: -1,
            timeout: 10.0,
        },
    )?;
    Ok(results
        .root
        .map(|root| root.top_extractions)
        .unwrap_or_default())
}

#[test]
fn yielded_extractions_are_valid_and_recomputable() -> extraction_tree::Result<()> {
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let doc = random_document(&mut rng);
        let rules = random_rules(&mut rng)?;

        for scored in exhaust(&doc, rules.clone())? {
            // Assigned fields are strictly above the validity threshold;
            // explicitly unfilled fields carry a zero score.
            for field in scored.extraction.fields() {
                assert!(scored.field_scores[field] > 0.1);
            }
            for (field, score) in &scored.field_scores {
                if scored.get(field).is_none() {
                    assert!(score.abs() < 1e-9);
                }
            }

            // The score is the mass-normalised sum of field scores
            let total: f64 = scored.field_scores.values().sum();
            assert!((scored.score - total / f64::from(scored.mass)).abs() < 1e-9);

            // Every decidable atom's recorded score is recomputable
            for rule in &rules {
                for atom in rule.atoms() {
                    let entities: Vec<EntityId> = atom
                        .fields
                        .iter()
                        .filter_map(|f| scored.get(f))
                        .collect();
                    if entities.len() != atom.fields.len() {
                        continue;
                    }
                    let recorded = scored
                        .rule_scores
                        .get(&atom.uuid)
                        .unwrap_or_else(|| panic!("atom {} unrecorded", atom.uuid));
                    let recomputed = atom.predicate.score(&entities, &doc)?;
                    assert!((recorded.score() - recomputed).abs() < 1e-9);
                }
            }
        }
    }

    Ok(())
}

#[test]
fn output_order_is_deterministic() -> extraction_tree::Result<()> {
    for seed in 0..4 {
        let mut rng = StdRng::seed_from_u64(seed);
        let doc = random_document(&mut rng);
        let rules = random_rules(&mut rng)?;
        let tree = extract(rules, None)?;

        let run = |tree: &extraction_tree::Node| -> extraction_tree::Result<Vec<f64>> {
            let results = run_model(
                &doc,
                tree,
                &Config {
                    num_samples: -1,
                    timeout: 10.0,
                },
            )?;
            Ok(results
                .root
                .map(|root| root.top_extractions.iter().map(|e| e.score).collect())
                .unwrap_or_default())
        };

        assert_eq!(run(&tree)?, run(&tree)?);
    }

    Ok(())
}

fn singleton_extraction(field: &str, entity: EntityId, score: f64) -> Rc<ScoredExtraction> {
    let field: Field = Field::from(field);
    let field_scores: BTreeMap<Field, f64> = [(field.clone(), score)].into();
    Rc::new(ScoredExtraction {
        extraction: Extraction::from_points([(field, entity)]).expect("one field"),
        score,
        field_scores,
        rule_scores: rustc_hash::FxHashMap::default(),
        mass: 1,
    })
}

#[test]
fn prefilter_never_drops_compatible_targets() -> extraction_tree::Result<()> {
    let target_field: Field = Field::from("t");
    let feeder_field: Field = Field::from("f");

    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(100 + seed);
        let doc = random_document(&mut rng);

        let predicate: AnyPredicate = if rng.random_range(0..2) == 0 {
            are_aligned(
                AlignmentLine::Bottoms,
                f64::from(rng.random_range(0..3)),
                Some(1.0),
            )?
        } else {
            are_arranged(
                Direction::LeftToRight,
                1.0,
                0.0,
                Some(f64::from(rng.random_range(5..30))),
            )?
        };
        // The engine always hands prefilters the *weakened* formula: only
        // literals restricting the target or computable from the feeder.
        let feeder_fields: BTreeSet<Field> = [feeder_field.clone()].into();
        let phi = extraction_tree::spatial_formula::weaken(
            &predicate.phi(&[target_field.clone(), feeder_field.clone()]),
            &target_field,
            &feeder_fields,
        );

        let mut prefilter = Prefilter::DocRegion(
            extraction_tree::prefilter::DocRegionPrefilter::new(
                target_field.clone(),
                &phi,
                &doc,
            ),
        );

        let entities: Vec<EntityId> = doc.entities().map(|(id, _)| id).collect();
        let targets: Vec<Rc<ScoredExtraction>> = entities
            .iter()
            .map(|id| singleton_extraction("t", *id, 0.9))
            .collect();
        for target in &targets {
            prefilter.add(target.clone());
        }

        for feeder_entity in &entities {
            let feeder = singleton_extraction("f", *feeder_entity, 0.8);
            let returned: Vec<*const ScoredExtraction> = prefilter
                .get(&feeder)
                .iter()
                .map(|t| Rc::as_ptr(t))
                .collect();

            for target in &targets {
                let lookup = |field: &Field| -> Option<BBox> {
                    if *field == target_field {
                        target.get("t").map(|id| doc.entity(id).bbox())
                    } else if *field == feeder_field {
                        feeder.get("f").map(|id| doc.entity(id).bbox())
                    } else {
                        None
                    }
                };

                if phi.evaluate(&lookup, &doc) {
                    assert!(
                        returned.contains(&Rc::as_ptr(target)),
                        "prefilter dropped a formula-compatible target"
                    );
                }
            }
        }
    }

    Ok(())
}

#[test]
fn weakening_formulas_cover_positive_scores() -> extraction_tree::Result<()> {
    let f1: Field = Field::from("x");
    let f2: Field = Field::from("y");

    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(200 + seed);
        let doc = random_document(&mut rng);
        let entities: Vec<EntityId> = doc.entities().map(|(id, _)| id).collect();

        let predicates: Vec<AnyPredicate> = vec![
            are_aligned(AlignmentLine::Bottoms, 0.5, Some(0.5))?,
            are_aligned(AlignmentLine::LeftSides, 1.0, None)?,
            are_arranged(Direction::TopDown, 0.5, 0.0, None)?,
            are_arranged(Direction::LeftToRight, 0.5, 0.0, Some(10.0))?,
            left_to_right_pair(),
            top_down_pair(),
        ];

        for predicate in &predicates {
            let phi = predicate.phi(&[f1.clone(), f2.clone()]);

            for e1 in &entities {
                for e2 in &entities {
                    let score = predicate.score(&[*e1, *e2], &doc)?;
                    if score <= 0.0 {
                        continue;
                    }

                    let lookup = |field: &Field| -> Option<BBox> {
                        if *field == f1 {
                            Some(doc.entity(*e1).bbox())
                        } else if *field == f2 {
                            Some(doc.entity(*e2).bbox())
                        } else {
                            None
                        }
                    };

                    assert!(
                        phi.evaluate(&lookup, &doc),
                        "weakening must hold wherever the predicate scores positive"
                    );
                }
            }
        }
    }

    Ok(())
}
