//! End-to-end preset round-trip tests.
//!
//! These tests save complete tasks to preset directories and load them back
//! through the public identifier-based API, beyond the unit test level.

use modelkit::backbone::{gpt2_layout, mistral_layout};
use modelkit::{
    Backbone, BackboneConfig, LoadOptions, ModelKitError, Preprocessor, SpecialTokens, Task,
    TaskKind, Tokenizer, VocabSource,
};

fn tiny_gpt2() -> (Backbone, Preprocessor) {
    let config = BackboneConfig {
        family: "gpt2".to_string(),
        vocab_size: 8,
        num_layers: 1,
        num_heads: 2,
        hidden_dim: 4,
        intermediate_dim: 8,
        max_sequence_length: 16,
    };
    let params = gpt2_layout(&config);
    let backbone = Backbone::with_params(config, params);

    let mut tokenizer = Tokenizer::new(
        "gpt2",
        SpecialTokens::new("<|endoftext|>", "<|endoftext|>"),
    );
    tokenizer
        .set_vocabulary(Some(VocabSource::Bytes(
            b"<|endoftext|>\t0\nhello\t1\nworld\t2\n".to_vec(),
        )))
        .unwrap();
    let preprocessor = Preprocessor::new(Some(tokenizer)).sequence_length(8);

    (backbone, preprocessor)
}

fn tiny_mistral_backbone() -> Backbone {
    let config = BackboneConfig {
        family: "mistral".to_string(),
        vocab_size: 8,
        num_layers: 1,
        num_heads: 2,
        hidden_dim: 4,
        intermediate_dim: 8,
        max_sequence_length: 16,
    };
    let params = mistral_layout(&config);
    Backbone::with_params(config, params)
}

/// Test a full classifier save and reload through a preset directory
#[test]
fn test_classifier_preset_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();

    let mut task = Task::text_classifier(backbone, Some(preprocessor), 3);

    // Distinct values in both partitions so the reload proves each one.
    task.backbone
        .param_mut("token_embedding.weight")
        .unwrap()
        .data[[1, 0]] = 0.5;
    task.head_param_mut("head.dense.weight").unwrap().data[[0, 1]] = 2.5;

    task.save_to_preset(dir.path()).unwrap();

    let preset = dir.path().to_str().unwrap();
    let reloaded = Task::from_preset(preset, &LoadOptions::default()).unwrap();

    assert_eq!(reloaded.kind(), TaskKind::TextClassifier);
    assert_eq!(reloaded.num_classes(), Some(3));
    assert!(
        (reloaded
            .backbone
            .param("token_embedding.weight")
            .unwrap()
            .data[[1, 0]]
            - 0.5)
            .abs()
            < 1e-6
    );
    assert!(
        (reloaded.head()[0].data[[0, 1]] - 2.5).abs() < 1e-6,
        "head weights should come back from task.weights.safetensors"
    );
}

/// Test that skipping weight loading leaves fresh parameters
#[test]
fn test_reload_without_weights_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();

    let mut task = Task::causal_lm(backbone, Some(preprocessor));
    task.backbone
        .param_mut("token_embedding.weight")
        .unwrap()
        .data[[1, 0]] = 0.5;
    task.save_to_preset(dir.path()).unwrap();

    let preset = dir.path().to_str().unwrap();
    let reloaded =
        Task::from_preset(preset, &LoadOptions::default().load_weights(false)).unwrap();

    assert_eq!(
        reloaded
            .backbone
            .param("token_embedding.weight")
            .unwrap()
            .data[[1, 0]],
        0.0
    );
}

/// Test that a backbone-only preset demands an explicit task kind
#[test]
fn test_backbone_only_preset_requires_explicit_kind() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();
    backbone.save_to_preset(dir.path()).unwrap();
    preprocessor.save_to_preset(dir.path()).unwrap();

    let preset = dir.path().to_str().unwrap();

    // Without a kind the load is under-specified.
    let err = Task::from_preset(preset, &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, ModelKitError::Usage(_)));
    assert!(err.to_string().contains("task kind"));

    // Naming one resolves it.
    let task = Task::from_preset(preset, &LoadOptions::task(TaskKind::CausalLm)).unwrap();
    assert_eq!(task.kind(), TaskKind::CausalLm);
}

/// Test that a family without a task kind rejects the load
#[test]
fn test_unsupported_task_kind_for_family() {
    let dir = tempfile::tempdir().unwrap();
    tiny_mistral_backbone().save_to_preset(dir.path()).unwrap();

    let preset = dir.path().to_str().unwrap();
    let err = Task::from_preset(
        preset,
        &LoadOptions::task(TaskKind::TextClassifier).num_classes(2),
    )
    .unwrap_err();

    match err {
        ModelKitError::UnsupportedTask { family, kind } => {
            assert_eq!(family, "mistral");
            assert_eq!(kind, "text_classifier");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test the unknown-identifier error surface
#[test]
fn test_unknown_identifier_is_reported() {
    let err =
        Task::from_preset("definitely_not_registered", &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, ModelKitError::UnknownPreset(_)));
    assert!(err
        .to_string()
        .starts_with("Unknown preset identifier: definitely_not_registered"));
}

/// Test the sequence length override at load time
#[test]
fn test_sequence_length_override() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();
    Task::causal_lm(backbone, Some(preprocessor))
        .save_to_preset(dir.path())
        .unwrap();

    let preset = dir.path().to_str().unwrap();
    let task = Task::from_preset(preset, &LoadOptions::default().sequence_length(4)).unwrap();

    assert_eq!(
        task.preprocessor.as_ref().unwrap().sequence_length_value(),
        4
    );
    let logits = task.predict(&["hello world"]).unwrap();
    assert_eq!(logits.shape(), &[1, 8]);
}

/// Test that compile=false strips the training configuration
#[test]
fn test_uncompiled_load_has_no_training() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();
    Task::causal_lm(backbone, Some(preprocessor))
        .save_to_preset(dir.path())
        .unwrap();

    let preset = dir.path().to_str().unwrap();
    let task = Task::from_preset(preset, &LoadOptions::default().compile(false)).unwrap();
    assert!(task.training().is_none());
}

/// Test that a custom training configuration survives the round trip
#[test]
fn test_saved_training_configuration_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();

    let mut task = Task::causal_lm(backbone, Some(preprocessor));
    task.compile(modelkit::TrainingConfig {
        optimizer: "sgd".to_string(),
        learning_rate: 0.01,
        loss: "mse".to_string(),
    });
    task.save_to_preset(dir.path()).unwrap();

    let preset = dir.path().to_str().unwrap();
    let reloaded = Task::from_preset(preset, &LoadOptions::default()).unwrap();

    let training = reloaded.training().unwrap();
    assert_eq!(training.optimizer, "sgd");
    assert!((training.learning_rate - 0.01).abs() < 1e-12);
}

/// Test that the saved tokenizer loads standalone from the same directory
#[test]
fn test_tokenizer_loads_from_task_preset() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();
    let expected = preprocessor
        .tokenizer
        .as_ref()
        .unwrap()
        .encode("hello world")
        .unwrap();

    Task::causal_lm(backbone, Some(preprocessor))
        .save_to_preset(dir.path())
        .unwrap();

    let preset = dir.path().to_str().unwrap();
    let tokenizer = Tokenizer::from_preset(preset).unwrap();
    assert_eq!(tokenizer.encode("hello world").unwrap(), expected);
    assert_eq!(tokenizer.vocabulary_size(), 3);
}

/// Test that task weights stay separate from backbone weights on disk
#[test]
fn test_task_weight_files_stay_partitioned() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();

    let mut task = Task::text_classifier(backbone, Some(preprocessor), 2);
    task.backbone
        .param_mut("final_norm.weight")
        .unwrap()
        .data[[2]] = 9.0;
    task.save_to_preset(dir.path()).unwrap();

    assert!(dir.path().join("model.weights.safetensors").exists());
    assert!(dir.path().join("task.weights.safetensors").exists());

    // A fresh task picking up only the task weights keeps its own backbone.
    let (fresh_backbone, fresh_preprocessor) = tiny_gpt2();
    let mut fresh = Task::text_classifier(fresh_backbone, Some(fresh_preprocessor), 2);
    fresh
        .load_task_weights(&dir.path().join("task.weights.safetensors"))
        .unwrap();

    assert_eq!(
        fresh.backbone.param("final_norm.weight").unwrap().data[[2]],
        0.0
    );
}

/// Test that head weights added after construction survive the round trip
#[test]
fn test_added_head_weights_survive_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (backbone, preprocessor) = tiny_gpt2();

    let mut task = Task::causal_lm(backbone, Some(preprocessor));
    let mut extra = ndarray::ArrayD::zeros(vec![2, 2]);
    extra[[0, 1]] = 3.5;
    task.add_head_weight("head.extra.weight", extra);
    task.save_to_preset(dir.path()).unwrap();

    assert!(dir.path().join("task.weights.safetensors").exists());

    let preset = dir.path().to_str().unwrap();
    let reloaded = Task::from_preset(preset, &LoadOptions::default()).unwrap();

    assert!(reloaded.has_task_weights());
    assert_eq!(reloaded.head().len(), 1);
    assert_eq!(reloaded.head()[0].name, "head.extra.weight");
    assert_eq!(reloaded.head()[0].shape(), &[2, 2]);
    assert!((reloaded.head()[0].data[[0, 1]] - 3.5).abs() < 1e-6);
}
