use crate::runtime::ReactiveRuntime;
use std::sync::{Arc, RwLock};

/// A reactive signal that holds a value and notifies observers when changed.
#[derive(Clone)]
pub struct Signal<T> {
    value: Arc<RwLock<T>>,
    id: usize,
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(initial: T) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();

        Self {
            value: Arc::new(RwLock::new(initial)),
            id,
        }
    }

    /// Get the current value of the signal.
    pub fn get(&self) -> T {
        let runtime = ReactiveRuntime::current();
        runtime.track_read(self.id);
        self.value.read().unwrap().clone()
    }

    /// Set a new value for the signal.
    pub fn set(&self, new_value: T) {
        *self.value.write().unwrap() = new_value;
        let runtime = ReactiveRuntime::current();
        runtime.notify_observers(self.id);
    }

    /// Update the value using a function.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.value.write().unwrap();
        f(&mut value);
        drop(value); // Release the write lock before notifying
        let runtime = ReactiveRuntime::current();
        runtime.notify_observers(self.id);
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let runtime = ReactiveRuntime::current();
        runtime.track_read(self.id);
        let value = self.value.read().unwrap();
        f(&value)
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Read half of a split signal.
#[derive(Clone)]
pub struct ReadSignal<T> {
    inner: Signal<T>,
}

impl<T: Clone + Send + Sync + 'static> ReadSignal<T> {
    /// Get the current value.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Read the value with a function without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }
}

/// Write half of a split signal.
#[derive(Clone)]
pub struct WriteSignal<T> {
    inner: Signal<T>,
}

impl<T: Clone + Send + Sync + 'static> WriteSignal<T> {
    /// Set a new value.
    pub fn set(&self, new_value: T) {
        self.inner.set(new_value);
    }

    /// Update the value using a function.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.update(f);
    }
}

/// Create a signal split into read and write handles.
///
/// # Example
///
/// ```
/// use stratum::create_signal;
///
/// let (count, set_count) = create_signal(0);
/// assert_eq!(count.get(), 0);
/// set_count.set(42);
/// assert_eq!(count.get(), 42);
/// ```
pub fn create_signal<T: Clone + Send + Sync + 'static>(
    initial: T,
) -> (ReadSignal<T>, WriteSignal<T>) {
    let signal = Signal::new(initial);
    (
        ReadSignal {
            inner: signal.clone(),
        },
        WriteSignal { inner: signal },
    )
}
