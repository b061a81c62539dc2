// Messaging - commands into the sequencer worker, notifications out of it

pub mod channels;
pub mod command;
pub mod notification;

pub use channels::{
    CommandReceiver, CommandSender, NotificationConsumer, NotificationProducer,
    create_command_channel, create_notification_channel,
};
pub use command::Command;
pub use notification::{Notification, NotificationCategory, NotificationLevel};
