// Channels between sequencer handles, the worker and observers

use crate::messaging::command::Command;
use crate::messaging::notification::Notification;
use crossbeam::channel::{Receiver, Sender};
use ringbuf::{HeapRb, traits::Split};

pub type CommandSender = Sender<Command>;
pub type CommandReceiver = Receiver<Command>;

/// Bounded command queue; senders block while the worker is busy
pub fn create_command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    crossbeam::channel::bounded(capacity)
}

pub type NotificationProducer = ringbuf::HeapProd<Notification>;
pub type NotificationConsumer = ringbuf::HeapCons<Notification>;

/// Lock-free notification buffer; a full buffer drops new notifications
pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    let rb = HeapRb::<Notification>::new(capacity);
    rb.split()
}
