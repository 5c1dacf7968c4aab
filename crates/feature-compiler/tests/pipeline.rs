//! End-to-end tests: descriptions to optimized modules, checked against the
//! eager features and the reference graph executor

use codegen_ir::ExecError;
use feature_compiler::{CompilerConfig, CompilerError, FeatureCompiler};
use feature_engine::{FeatureError, FeatureSet};
use ir_optimizer::{OptimizerConfig, TargetSpec};
use model_graph::ModelExecutor;
use proptest::prelude::*;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn configs() -> Vec<CompilerConfig> {
    vec![
        CompilerConfig::default(),
        CompilerConfig::debug(),
        CompilerConfig::size_optimized(),
        CompilerConfig {
            target: Some(TargetSpec::avx2()),
            ..Default::default()
        },
        CompilerConfig {
            optimizer: OptimizerConfig {
                opt_level: 3,
                ..Default::default()
            },
            target: Some(TargetSpec::avx512()),
            ..Default::default()
        },
        CompilerConfig {
            target: Some(TargetSpec::scalar()),
            ..Default::default()
        },
    ]
}

fn sample(step: usize, width: usize) -> Vec<f64> {
    (0..width)
        .map(|i| ((step * 7 + i * 3) % 11) as f64 * 0.5 - 2.0)
        .collect()
}

fn assert_close(expected: &[f64], actual: &[f64], context: &str) {
    assert_eq!(expected.len(), actual.len(), "{}", context);
    for (e, a) in expected.iter().zip(actual) {
        assert!((e - a).abs() < 1e-9, "{}: {:?} vs {:?}", context, expected, actual);
    }
}

#[test]
fn test_golden_trace() {
    init_logging();
    let compiled = FeatureCompiler::new(CompilerConfig::default())
        .compile_descriptions(vec![
            vec!["X", "input", "1"],
            vec!["V", "incremental_variance", "X", "2"],
        ])
        .unwrap();
    let mut session = compiled.session();
    let trace: Vec<f64> = [1.0, 3.0, 5.0]
        .iter()
        .map(|v| session.predict(&[*v]).unwrap()[0])
        .collect();
    assert_close(&[0.25, 1.0, 1.0], &trace, "golden trace");
    assert_eq!(session.samples(), 3);
}

#[test]
fn test_every_kind_matches_eager_and_graph() {
    init_logging();
    for kind in ["mean", "incremental_mean", "variance", "incremental_variance"] {
        for width in [1, 3, 6] {
            let descriptions = vec![
                vec!["X".to_string(), "input".to_string(), width.to_string()],
                vec!["F".to_string(), kind.to_string(), "X".to_string(), "3".to_string()],
            ];
            for config in configs() {
                let context = format!("{} width {} {:?}", kind, width, config);
                let mut set = FeatureSet::from_descriptions(&descriptions).unwrap();
                let graph = set.build_model().unwrap();
                let compiled = FeatureCompiler::new(config).compile(&set).unwrap();
                assert_eq!(compiled.input_size, width);
                assert_eq!(compiled.output_size, width);

                let mut executor = ModelExecutor::new(&graph.model);
                let mut session = compiled.session();
                for step in 0..10 {
                    let sample = sample(step, width);
                    let eager = set.process_sample(&sample).unwrap();
                    let reference = executor.compute(&sample, &graph.output).unwrap();
                    let optimized = session.predict(&sample).unwrap();
                    assert_close(&eager, &reference, &context);
                    assert_close(&eager, &optimized, &context);
                }
            }
        }
    }
}

#[test]
fn test_chained_features() {
    init_logging();
    let descriptions = vec![
        vec!["X", "input", "5"],
        vec!["M", "mean", "X", "4"],
        vec!["V", "variance", "M", "3"],
        vec!["W", "incremental_variance", "V", "2"],
    ];
    for config in configs() {
        let mut set = FeatureSet::from_descriptions(&descriptions).unwrap();
        let compiled = FeatureCompiler::new(config).compile(&set).unwrap();
        let mut session = compiled.session();
        for step in 0..16 {
            let sample = sample(step, 5);
            let eager = set.process_sample(&sample).unwrap();
            assert_close(&eager, &session.predict(&sample).unwrap(), "chained");
        }
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let set = FeatureSet::from_descriptions(vec![
        vec!["X", "input", "7"],
        vec!["V", "incremental_variance", "X", "4"],
    ])
    .unwrap();
    let compiler = FeatureCompiler::new(CompilerConfig {
        target: Some(TargetSpec::avx2()),
        ..Default::default()
    });
    let first = compiler.compile(&set).unwrap();
    let second = compiler.compile(&set).unwrap();
    assert_eq!(first.module, second.module);
    assert_eq!(first.module.to_string(), second.module.to_string());
}

#[test]
fn test_compile_leaves_eager_state_alone() {
    let mut set = FeatureSet::from_descriptions(vec![
        vec!["X", "input", "1"],
        vec!["M", "incremental_mean", "X", "2"],
    ])
    .unwrap();
    set.process_sample(&[4.0]).unwrap();
    FeatureCompiler::default().compile(&set).unwrap();
    assert_eq!(set.process_sample(&[2.0]).unwrap(), vec![3.0]);
}

#[test]
fn test_session_reset() {
    let compiled = FeatureCompiler::default()
        .compile_descriptions(vec![
            vec!["X", "input", "2"],
            vec!["M", "mean", "X", "3"],
        ])
        .unwrap();
    let mut session = compiled.session();
    let first = session.predict(&[3.0, 6.0]).unwrap();
    session.predict(&[9.0, 9.0]).unwrap();
    session.reset();
    assert_eq!(session.samples(), 0);
    assert_eq!(session.predict(&[3.0, 6.0]).unwrap(), first);

    // sessions do not share state
    let mut other = compiled.session();
    assert_eq!(other.predict(&[3.0, 6.0]).unwrap(), first);
}

#[test]
fn test_wrong_sample_size() {
    let compiled = FeatureCompiler::default()
        .compile_descriptions(vec![vec!["X", "input", "2"]])
        .unwrap();
    let mut session = compiled.session();
    assert_eq!(
        session.predict(&[1.0]),
        Err(ExecError::InputSize { expected: 2, actual: 1 })
    );
    assert_eq!(session.predict(&[1.0, 2.0]).unwrap(), vec![1.0, 2.0]);
}

#[test]
fn test_description_errors_propagate() {
    let compiler = FeatureCompiler::default();
    let result = compiler.compile_descriptions(vec![
        vec!["X", "input", "1"],
        vec!["V", "variance", "Y", "2"],
    ]);
    assert!(matches!(
        result,
        Err(CompilerError::Feature(FeatureError::UnresolvedReference(ref id))) if id == "Y"
    ));

    let result = compiler.compile(&FeatureSet::new());
    assert!(matches!(result, Err(CompilerError::Feature(FeatureError::IllegalState(_)))));
}

#[test]
fn test_invalid_optimizer_config() {
    let compiler = FeatureCompiler::new(CompilerConfig {
        optimizer: OptimizerConfig {
            vector_width: 0,
            ..Default::default()
        },
        ..Default::default()
    });
    let result = compiler.compile_descriptions(vec![vec!["X", "input", "1"]]);
    assert!(matches!(result, Err(CompilerError::Optimizer(_))));
}

#[test]
fn test_load_config_with_env_override() {
    init_logging();
    let path = std::env::temp_dir().join(format!("feature-compiler-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[lowering]
module_name = "sensors"

[optimizer]
opt_level = 1
vector_width = 2

[target]
name = "sse2"
vector_width = 2
"#,
    )
    .unwrap();

    std::env::set_var("FEATURE_COMPILER__OPTIMIZER__OPT_LEVEL", "3");
    let config = CompilerConfig::load(&path);
    std::env::remove_var("FEATURE_COMPILER__OPTIMIZER__OPT_LEVEL");
    std::fs::remove_file(&path).unwrap();

    let config = config.unwrap();
    assert_eq!(config.lowering.module_name, "sensors");
    assert_eq!(config.lowering.unroll_threshold, 4);
    assert_eq!(config.optimizer.opt_level, 3);
    assert_eq!(config.optimizer.vector_width, 2);
    assert!(config.optimizer.slp_vectorize);
    assert_eq!(config.target, Some(TargetSpec::sse2()));

    let compiled = FeatureCompiler::new(config)
        .compile_descriptions(vec![vec!["X", "input", "1"]])
        .unwrap();
    assert_eq!(compiled.entry, "sensors_predict");
}

proptest! {
    #[test]
    fn test_compiled_matches_eager_on_random_streams(
        window in 1usize..6,
        stream in prop::collection::vec(prop::collection::vec(-100.0f64..100.0, 3), 1..24),
    ) {
        let descriptions = vec![
            vec!["X".to_string(), "input".to_string(), "3".to_string()],
            vec!["V".to_string(), "incremental_variance".to_string(), "X".to_string(), window.to_string()],
        ];
        let mut set = FeatureSet::from_descriptions(&descriptions).unwrap();
        let compiled = FeatureCompiler::default().compile(&set).unwrap();
        let mut session = compiled.session();
        for sample in &stream {
            let eager = set.process_sample(sample).unwrap();
            let optimized = session.predict(sample).unwrap();
            for (e, o) in eager.iter().zip(&optimized) {
                prop_assert!((e - o).abs() < 1e-6 * (1.0 + e.abs()), "{} vs {}", e, o);
            }
        }
    }
}
