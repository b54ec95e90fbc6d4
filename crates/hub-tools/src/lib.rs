pub mod notify;
pub mod render;

pub use notify::{MemoryNotificationSink, NotificationSink, TracingNotificationSink};
pub use render::{DocumentRenderer, RenderedDocument, TextInvoiceRenderer};
