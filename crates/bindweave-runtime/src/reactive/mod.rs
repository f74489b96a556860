#![forbid(unsafe_code)]

//! Reactive data model: observable records, path subscriptions, and the
//! weak element reference table.

pub mod observable;
pub mod path_observer;
pub mod record;
pub mod weak_ref;

pub use observable::{Listener, ListenerResult, Observable, ObservableRecord};
pub use path_observer::{PathSink, PathSubscription, is_observable_path, observe_path};
pub use record::{DynamicRecord, ObjectRef, ObservableObject, Record};
pub use weak_ref::{BulkPass, GENERATED_ID_PREFIX, WeakRefTable, element_id};
