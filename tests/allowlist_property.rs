//! Property: every statement the validator accepts, whether synthesized or
//! repaired, references only identifiers of its catalog.

use querypilot::execution_loop::{RepairContext, RepairStrategy, SchemaBasedStrategy};
use querypilot::{
    CorrectionHistory, ExecutionError, ExecutionErrorKind, ForeignKey, IntentExtractor,
    SafetyValidator, SchemaCatalog, SqlSynthesizer, TableSchema,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;

const WORDS: &[&str] = &[
    "alpha", "bravo", "delta", "ember", "fjord", "gamma", "heron", "indigo", "juniper", "kappa",
    "lumen", "magma", "nadir", "onyx", "prism", "quartz", "rivet", "sigma", "tundra", "umbra",
];

const SQL_WORDS: &[&str] = &["SELECT", "FROM", "JOIN", "ON", "WHERE", "COUNT", "AVG", "MAX", "MIN", "SUM"];

fn random_catalog(rng: &mut StdRng) -> SchemaCatalog {
    let table_count = rng.gen_range(1..=4);
    let mut names: Vec<&str> = WORDS.to_vec();
    names.shuffle(rng);

    let tables: Vec<TableSchema> = (0..table_count)
        .map(|t| {
            let column_count = rng.gen_range(1..=5);
            let columns: Vec<String> = (0..column_count)
                .map(|c| {
                    let word = WORDS[rng.gen_range(0..WORDS.len())];
                    // shared key columns across tables on purpose
                    if c == 0 {
                        "ref_id".to_string()
                    } else {
                        format!("{}_{}", word, c)
                    }
                })
                .collect();
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            let mut deduped: Vec<&str> = Vec::new();
            for column in columns {
                if !deduped.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    deduped.push(column);
                }
            }
            let name = if rng.gen_bool(0.5) {
                names[t].to_uppercase()
            } else {
                format!("{}_tbl", names[t])
            };
            TableSchema::new(name, &deduped)
        })
        .collect();

    let mut relations = Vec::new();
    for pair in tables.windows(2) {
        if rng.gen_bool(0.7) {
            relations.push(ForeignKey::new(&pair[1].name, "ref_id", &pair[0].name, "ref_id"));
        }
    }

    SchemaCatalog::new(tables, relations).unwrap()
}

fn random_question(rng: &mut StdRng, catalog: &SchemaCatalog) -> String {
    let tables = catalog.tables();
    let mut parts: Vec<String> = Vec::new();

    if rng.gen_bool(0.3) {
        parts.push(["count", "average", "max", "total"][rng.gen_range(0..4)].to_string());
    }
    parts.push("show".to_string());

    let picked = rng.gen_range(0..=tables.len().min(3));
    let chosen: Vec<&str> = tables.choose_multiple(rng, picked).copied().collect();
    for table in chosen {
        if let Some(columns) = catalog.columns(table) {
            if let Some(column) = columns.choose(rng) {
                parts.push(column.to_lowercase());
            }
        }
        parts.push(table.to_string());
    }

    if rng.gen_bool(0.2) {
        parts.push(WORDS[rng.gen_range(0..WORDS.len())].to_string());
    }

    if rng.gen_bool(0.5) {
        let columns = catalog.all_columns();
        let column = &columns[rng.gen_range(0..columns.len())];
        let value = if rng.gen_bool(0.5) {
            rng.gen_range(0..100).to_string()
        } else {
            WORDS[rng.gen_range(0..WORDS.len())].to_string()
        };
        let op = ["=", ">", "<", "greater than"][rng.gen_range(0..4)];
        parts.push(format!("where {} {} {}", column, op, value));
    }

    parts.join(" ")
}

/// Identifiers outside string literals and numbers, minus SQL words.
fn identifiers(sql: &str) -> Vec<String> {
    let literal = Regex::new(r"'(?:[^']|'')*'").unwrap();
    let word = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
    let stripped = literal.replace_all(sql, "''");

    word.find_iter(&stripped)
        .filter(|m| !stripped[..m.start()].ends_with(|c: char| c.is_ascii_digit()))
        .map(|m| m.as_str().to_string())
        .filter(|w| !SQL_WORDS.iter().any(|k| k.eq_ignore_ascii_case(w)))
        .collect()
}

fn assert_allowlisted(sql: &str, catalog: &SchemaCatalog) {
    for ident in identifiers(sql) {
        assert!(
            catalog.is_known_identifier(&ident),
            "identifier {} in accepted SQL is not in the catalog: {}",
            ident,
            sql
        );
    }
}

/// Rename one catalog identifier into something the catalog does not know.
fn corrupt(rng: &mut StdRng, sql: &str) -> Option<String> {
    let idents = identifiers(sql);
    let target = idents.choose(rng)?;
    Some(sql.replacen(target.as_str(), &format!("{}x", target), 1))
}

#[test]
fn accepted_sql_only_references_catalog_identifiers() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);
    let extractor = IntentExtractor::default();
    let synthesizer = SqlSynthesizer::new();
    let validator = SafetyValidator::new();
    let repairer = SchemaBasedStrategy::default();
    let history = CorrectionHistory::default();

    let mut accepted = 0;
    let mut repaired = 0;

    for _ in 0..500 {
        let catalog = random_catalog(&mut rng);
        let question = random_question(&mut rng, &catalog);

        let intent = extractor.extract(&question, &catalog);
        let plan = synthesizer.synthesize(&intent, &catalog, catalog.relations(), None);
        assert_eq!(
            plan,
            synthesizer.synthesize(&intent, &catalog, catalog.relations(), None),
            "synthesis is deterministic"
        );

        if intent.referenced_tables().len() > 2 {
            assert!(!plan.is_plan(), "more than two tables planned: {}", question);
        }

        let Some(sql) = plan.sql() else {
            continue;
        };
        if validator.validate(sql, &catalog).is_err() {
            continue;
        }
        accepted += 1;
        assert_allowlisted(sql, &catalog);

        let Some(broken) = corrupt(&mut rng, sql) else {
            continue;
        };
        let ctx = RepairContext {
            catalog: &catalog,
            history: &history,
        };
        let error = ExecutionError::new(ExecutionErrorKind::UnknownColumn, "no such column");
        if let Some(repair) = repairer.attempt(&broken, &error, &ctx) {
            if validator.validate(&repair.sql, &catalog).is_ok() {
                repaired += 1;
                assert_allowlisted(&repair.sql, &catalog);
            }
        }
    }

    assert!(accepted > 50, "only {} statements accepted", accepted);
    assert!(repaired > 0);
}

#[test]
fn statement_separator_is_always_rejected() {
    let mut rng = StdRng::seed_from_u64(7);
    let validator = SafetyValidator::new();

    for _ in 0..100 {
        let catalog = random_catalog(&mut rng);
        let table = catalog.tables()[0].to_string();
        let suffix = ["", " DROP TABLE x", " SELECT 1", "  "][rng.gen_range(0..4)];
        let sql = format!("SELECT * FROM {};{}", table, suffix);
        assert!(validator.validate(&sql, &catalog).is_err(), "{}", sql);
    }
}
