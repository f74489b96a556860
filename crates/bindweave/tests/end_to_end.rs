#![forbid(unsafe_code)]

//! Binding passes driven through the public facade.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use bindweave::prelude::*;
use bindweave_core::testing::{advance_and_run, manual_scheduler};
use bindweave_runtime::testing::LogCapture;
use tracing::Level;

fn engine() -> (ManualClock, Engine) {
    let (clock, scheduler) = manual_scheduler();
    let engine = Engine::with_scheduler(BindingConfig::default(), scheduler)
        .expect("default config is valid");
    (clock, engine)
}

fn bound(tag: &str, expression: &str) -> ElementRef {
    ElementRef::new(tag).with_attribute("data-bind", expression)
}

#[test]
fn nested_observable_path_stays_in_sync() {
    let (_clock, engine) = engine();
    let user = engine.observable().with("name", "Ann");
    let data = ObjectRef::plain().with("user", user.clone());
    let label = bound("span", "label: user.name");
    engine.document().root().append_child(&label);

    let done = engine.process_all(ProcessOptions::new().with_data_context(data));
    engine.run_until_idle();
    assert!(done.is_resolved());
    assert_eq!(label.field("label"), Some(Value::from("Ann")));

    user.update_property("name", Value::from("Bo"));
    engine.run_until_idle();
    assert_eq!(label.field("label"), Some(Value::from("Bo")));
}

#[test]
fn replacing_an_intermediate_object_rebinds_the_tail() {
    let (_clock, engine) = engine();
    let ann = engine.observable().with("name", "Ann");
    let data = engine.observable().with("user", ann.clone());
    let label = bound("span", "label: user.name");
    engine.document().root().append_child(&label);

    engine.process_all(ProcessOptions::new().with_data_context(data.clone()));
    engine.run_until_idle();

    let cy = engine.observable().with("name", "Cy");
    data.update_property("user", Value::from(cy.clone()));
    engine.run_until_idle();
    assert_eq!(label.field("label"), Some(Value::from("Cy")));

    ann.update_property("name", Value::from("stale"));
    engine.run_until_idle();
    assert_eq!(label.field("label"), Some(Value::from("Cy")));

    cy.update_property("name", Value::from("Di"));
    engine.run_until_idle();
    assert_eq!(label.field("label"), Some(Value::from("Di")));
}

#[test]
fn detached_destination_cancels_itself_once() {
    let capture = LogCapture::new();
    let _guard = capture.install();
    let (_clock, engine) = engine();
    let data = engine.observable().with("name", "Ann");
    let label = bound("span", "label: name");
    engine.document().root().append_child(&label);

    engine.process_all(ProcessOptions::new().with_data_context(data.clone()));
    engine.run_until_idle();
    assert_eq!(label.field("label"), Some(Value::from("Ann")));

    label.detach();
    data.update_property("name", Value::from("Bo"));
    engine.run_until_idle();
    data.update_property("name", Value::from("Cy"));
    engine.run_until_idle();

    assert_eq!(label.field("label"), Some(Value::from("Ann")));
    assert_eq!(capture.count_where(Level::INFO, "bindweave::declarative"), 1);
}

#[test]
fn reprocessing_with_a_shared_cache_replaces_bindings() {
    let (_clock, engine) = engine();
    let data = engine.observable().with("name", "Ann");
    let label = bound("span", "label: name");
    engine.document().root().append_child(&label);

    let writes = Rc::new(Cell::new(0));
    let counted = {
        let writes = Rc::clone(&writes);
        Initializer::from_fn("counted", move |ctx| {
            writes.set(writes.get() + 1);
            if let Some(value) = ctx.resolve_source() {
                ctx.target.set_field("label", value);
            }
            Ok(Some(BindingHandle::new()))
        })
    };
    let cache = BindingCache::new();
    let options = ProcessOptions::new()
        .with_data_context(data)
        .with_cache(cache.clone())
        .with_default_initializer(counted);

    engine.process_all(options.clone());
    engine.run_until_idle();
    let id = label.id().expect("processed elements get an id");
    assert_eq!(cache.binding_count(&id), 1);
    assert_eq!(cache.expression_count(), 1);

    engine.process_all(options);
    engine.run_until_idle();
    assert_eq!(writes.get(), 2);
    assert_eq!(cache.binding_count(&id), 1, "the first pass's binding was canceled");
    assert_eq!(cache.expression_count(), 1);
}

#[test]
fn reprocessing_before_a_pending_change_delivers_the_latest_value() {
    let (_clock, engine) = engine();
    let data = engine.observable().with("name", "Ann");
    let label = bound("span", "label: name");
    engine.document().root().append_child(&label);
    let options = ProcessOptions::new()
        .with_data_context(data.clone())
        .with_cache(BindingCache::new());

    engine.process_all(options.clone());
    engine.run_until_idle();

    data.update_property("name", Value::from("Bo"));
    engine.process_all(options);
    data.update_property("name", Value::from("Cy"));
    engine.run_until_idle();

    assert_eq!(data.get_property("name"), Some(Value::from("Cy")));
    assert_eq!(label.field("label"), Some(Value::from("Cy")));
}

struct Template;

impl ControlActivator for Template {
    fn is_container(&self, element: &ElementRef) -> bool {
        element.tag() == "template"
    }

    fn bind_container(&self, _element: &ElementRef, binder: ContainerBinder) -> PassCompletion {
        binder.bind_children()
    }
}

#[test]
fn container_content_binds_only_through_the_activator() {
    let data = ObjectRef::plain().with("name", "Ann");
    let container = |item: &ElementRef| {
        ElementRef::new("template")
            .with_attribute("data-control", "Template")
            .with_child(item.clone())
    };

    let (_clock, plain) = engine();
    let item = bound("li", "label: name");
    plain.document().root().append_child(&container(&item));
    let done = plain.process_all(ProcessOptions::new().with_data_context(data.clone()));
    plain.run_until_idle();
    assert!(done.is_resolved());
    assert_eq!(item.field("label"), None, "container content is left to the activator");

    let (_clock, active) = engine();
    let active = active.with_activator(Rc::new(Template));
    let item = bound("li", "label: name");
    active.document().root().append_child(&container(&item));
    let done = active.process_all(ProcessOptions::new().with_data_context(data));
    active.run_until_idle();
    assert!(done.is_resolved());
    assert_eq!(item.field("label"), Some(Value::from("Ann")));
}

#[test]
fn parse_error_fails_the_pass() {
    let (_clock, engine) = engine();
    let broken = bound("p", "label name");
    engine.document().root().append_child(&broken);

    let done = engine.process_all(ProcessOptions::new().with_data_context(ObjectRef::plain()));
    engine.run_until_idle();
    let err = done.error().expect("pass should fail");
    assert_eq!(err.failures.len(), 1);
    assert!(matches!(err.failures[0].error, BindingError::Parse(_)));
}

#[test]
fn detached_references_expire_after_the_timeout() {
    let (clock, engine) = engine();
    let element = ElementRef::new("div");
    let id = engine.weak_refs().create_ref(&element, None);
    drop(element);

    advance_and_run(&clock, engine.scheduler(), Duration::from_millis(400));
    assert!(engine.weak_refs().get_ref_element(&id).is_some());

    advance_and_run(&clock, engine.scheduler(), Duration::from_millis(1200));
    assert!(engine.weak_refs().get_ref_element(&id).is_none());
}
