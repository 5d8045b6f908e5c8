use crate::runtime::ReactiveRuntime;
use std::sync::Arc;

/// A side effect that runs when its dependencies change.
pub struct Effect {
    run: Arc<dyn Fn() + Send + Sync>,
    id: usize,
}

impl Effect {
    fn new<F>(effect: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let effect = Arc::new(effect);
        let effect_clone = effect.clone();

        // Re-runs re-track dependencies, so effects whose reads change
        // between runs stay subscribed to the right signals.
        runtime.create_observer(id, move || {
            let runtime = ReactiveRuntime::current();
            runtime.run_tracked(id, || effect_clone());
        });

        // Run immediately within the observer context to track dependencies
        runtime.run_tracked(id, || effect());

        Self { run: effect, id }
    }

    /// Manually trigger the effect.
    pub fn run(&self) {
        (self.run)();
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Create a new effect that runs when dependencies change.
///
/// The effect runs immediately and then again whenever any signal
/// it reads changes.
pub fn create_effect<F>(effect: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(effect)
}
