//! Observer-set signal primitive (§9): a small vector of subscriber
//! callbacks invoked synchronously, in registration order, on whatever
//! thread raises the signal. Deliberately not async — handlers execute
//! directly on the capture/source thread per §5's scheduling model.

pub struct Signal<T> {
    subscribers: Vec<Box<dyn FnMut(&T) + Send>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal {
            subscribers: Vec::new(),
        }
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, subscriber: impl FnMut(&T) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    pub fn emit(&mut self, value: &T) {
        for subscriber in &mut self.subscribers {
            subscriber(value);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
