//! Self-referential schemas: binding and completion must only ever look up
//! single fields.

use formula_engine::{Engine, EngineConfig, ErrorKind};
use formula_types::{DType, EnumLiteral, EnumType, Kind, RecordType, RecordTypeSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `Loop = { Id: Number, Loop: Loop }`, counting enumerations.
#[derive(Debug, Default)]
struct LoopSource {
    enumerated: AtomicUsize,
}

fn loop_type(source: &Arc<LoopSource>) -> RecordType {
    RecordType::lazy(source.clone())
}

impl RecordTypeSource for LoopSource {
    fn identity(&self) -> &str {
        "Loop"
    }

    fn try_get_field_type(&self, name: &str) -> Option<DType> {
        match name {
            "Id" => Some(DType::Number),
            "Loop" => Some(DType::Record(RecordType::lazy(Arc::new(LoopSource::default())))),
            _ => None,
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.enumerated.fetch_add(1, Ordering::SeqCst);
        vec!["Id".to_string(), "Loop".to_string()]
    }

    fn display_name_for(&self, logical: &str) -> Option<String> {
        (logical == "Id").then(|| "Identifier".to_string())
    }
}

fn loop_engine() -> (Engine, Arc<LoopSource>) {
    let source = Arc::new(LoopSource::default());
    let mut engine = Engine::new(EngineConfig::default());
    engine
        .declare_variable("Root", DType::Record(loop_type(&source)))
        .unwrap();
    (engine, source)
}

fn deep_path(levels: usize) -> String {
    format!("Root{}", ".Loop".repeat(levels))
}

#[test]
fn test_deep_dotted_access_binds() {
    let (engine, source) = loop_engine();
    let result = engine.check(&format!("{}.Id + 1", deep_path(100)), &RecordType::empty());
    assert!(result.success, "{:?}", result.diagnostics);
    assert_eq!(result.return_type, DType::Number);
    assert_eq!(source.enumerated.load(Ordering::SeqCst), 0);
}

#[test]
fn test_unknown_field_deep_in_loop() {
    let (engine, _) = loop_engine();
    let result = engine.check(&format!("{}.Nope", deep_path(50)), &RecordType::empty());
    let kinds: Vec<ErrorKind> = result.errors().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![ErrorKind::UnknownField]);
}

#[test]
fn test_suggest_members_after_deep_path() {
    let (engine, _) = loop_engine();
    let text = format!("{}.", deep_path(100));
    assert_eq!(
        engine.suggest(&text, text.len()),
        vec!["Id".to_string(), "Identifier".to_string(), "Loop".to_string()]
    );

    let text = format!("1 + {}.Lo", deep_path(3));
    assert_eq!(engine.suggest(&text, text.len()), vec!["Loop".to_string()]);
}

#[test]
fn test_suggest_enum_members_and_globals() {
    let mut engine = Engine::default();
    engine
        .add_enum(EnumType::new(
            "Color",
            Kind::String,
            [
                ("Red", EnumLiteral::String("red".into())),
                ("Green", EnumLiteral::String("green".into())),
            ],
        ))
        .unwrap();
    assert_eq!(
        engine.suggest("Color.", 6),
        vec!["Green".to_string(), "Red".to_string()]
    );
    assert_eq!(
        engine.suggest("If(Col", 6),
        vec!["Collect".to_string(), "Color".to_string()]
    );
}
