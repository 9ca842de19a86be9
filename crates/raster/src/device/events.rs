//! Change notifications raised by paint devices

use crossbeam_channel::{Receiver, unbounded};

/// Events emitted synchronously after the corresponding mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    VisibilityChanged { visible: bool },
    PositionChanged { x: i32, y: i32 },
    /// The device now uses the color space with this id
    ProfileChanged { color_space: &'static str },
    /// Percentage of a long-running operation completed
    IoProgress(u8),
}

type Listener = Box<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Registered observers of one device
#[derive(Default)]
pub(crate) struct Listeners {
    listeners: Vec<Listener>,
}

impl Listeners {
    pub fn add<F>(&mut self, listener: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Route events into a channel for consumers on another thread.
    /// A dropped receiver just stops receiving.
    pub fn subscribe(&mut self) -> Receiver<DeviceEvent> {
        let (sender, receiver) = unbounded();
        self.add(move |event| {
            let _ = sender.send(event.clone());
        });
        receiver
    }

    pub fn emit(&self, event: DeviceEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

/// Throttles progress events to whole-percent changes
pub(crate) struct ProgressReporter<'a> {
    listeners: &'a Listeners,
    total: usize,
    last: Option<u8>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(listeners: &'a Listeners, total: usize) -> Self {
        Self {
            listeners,
            total: total.max(1),
            last: None,
        }
    }

    pub fn update(&mut self, done: usize) {
        let percent = ((done.min(self.total) * 100) / self.total) as u8;
        if self.last.is_none_or(|last| percent >= last.saturating_add(10) || (percent == 100 && last != 100)) {
            self.last = Some(percent);
            self.listeners.emit(DeviceEvent::IoProgress(percent));
        }
    }

    pub fn finish(&mut self) {
        self.update(self.total);
    }
}
