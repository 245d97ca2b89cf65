//! Plug event observers.
//!
//! Observers are called synchronously while an edit holds the graph's write
//! lock, so they must not call back into the graph. For any plug, every
//! observer sees its `Dirtied` event before propagation moves on to the
//! plug's dependents.

use std::sync::Arc;

use crate::plug::PlugId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlugEvent {
    /// An authored value was set (or reset to default)
    Set(PlugId),
    /// The plug's upstream connection changed
    InputChanged(PlugId),
    /// The plug's hash and value may have changed
    Dirtied(PlugId),
}

impl PlugEvent {
    pub fn plug(&self) -> &PlugId {
        match self {
            PlugEvent::Set(plug) | PlugEvent::InputChanged(plug) | PlugEvent::Dirtied(plug) => plug,
        }
    }
}

pub type Observer = Arc<dyn Fn(&PlugEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Observers {
    next_id: u64,
    observers: Vec<(SubscriptionId, Observer)>,
}

impl Observers {
    pub fn subscribe(&mut self, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Observers in subscription order.
    pub fn snapshot(&self) -> Vec<Observer> {
        self.observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }
}

pub(crate) fn notify(observers: &[Observer], event: &PlugEvent) {
    for observer in observers {
        observer(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use std::sync::Mutex;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut observers = Observers::default();
        let sink = Arc::clone(&seen);
        let id = observers.subscribe(Arc::new(move |event: &PlugEvent| {
            sink.lock().unwrap().push(event.clone());
        }));

        let event = PlugEvent::Dirtied(PlugId::new(NodeId::new(), "out"));
        notify(&observers.snapshot(), &event);
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        notify(&observers.snapshot(), &event);

        assert_eq!(*seen.lock().unwrap(), vec![event]);
    }
}
