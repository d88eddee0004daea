use spawnq::*;

/// Image the fake orchestrator drives to `Running`.
pub const RUNNING_IMAGE: &str = "jupyter/minimal-notebook";
/// Image the fake orchestrator reports as unpullable.
pub const UNRESOLVABLE_IMAGE: &str = "registry.invalid/unresolvable:latest";
/// Image the fake orchestrator never reports status for.
pub const SILENT_IMAGE: &str = "registry.invalid/silent:latest";

/// Descriptor for a fresh notebook running `image`.
pub fn notebook(image: &str) -> NotebookDescriptor {
    NotebookDescriptor::from_config(
        &NotebookConfig::default(),
        NotebookId::new(),
        "testkit",
        Some(image.to_string()),
    )
}

/// Descriptor that the fake orchestrator will run to `Running`.
pub fn running_notebook() -> NotebookDescriptor {
    notebook(RUNNING_IMAGE)
}
