use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use modwire::*;

#[derive(Default)]
struct Widget {
    label: String,
}

type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log) -> Injectable<Module> {
    let log = log.clone();
    Injectable::new(Vec::<String>::new(), move |module: &mut Module, _: &Args| {
        log.lock().unwrap().push(module.name().to_string());
    })
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn modules_are_cached_by_name() {
    let modules = Registrar::new();
    let a = modules.module("a");

    assert!(Module::ptr_eq(&a, &modules.module("a")));
    // the first creation decides the kind
    assert!(!modules.app("a").is_app());
    assert!(modules.app("x").is_app());
    assert_eq!(modules.names(), vec!["a", "x"]);
}

#[test]
fn used_registrations_are_visible() -> Result<(), WiringError> {
    let modules = Registrar::new();
    modules.module("a").register_value("db", String::from("sqlite"));
    let b = modules.module("b");
    b.uses(["a"]);

    assert_eq!(b.get_as::<String>("db")?.as_str(), "sqlite");
    assert_eq!(b.dependencies(), vec!["a"]);
    Ok(())
}

#[test]
fn local_registrations_win_over_used_ones() -> Result<(), WiringError> {
    let modules = Registrar::new();
    modules.module("a").register_value("mode", "shared");
    let b = modules.module("b");
    b.register_value("mode", "local").uses(["a"]);

    assert_eq!(*b.get_as::<&str>("mode")?, "local");
    Ok(())
}

#[test]
fn used_factories_are_instantiated_per_module() -> Result<(), WiringError> {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let modules = Registrar::new();
    let a = modules.module("a");
    a.service(
        "svc",
        Constructor::new(inject!(|| {
            counter.fetch_add(1, Ordering::SeqCst);
            instance(Widget::default())
        })),
    )?;
    let from_a = a.get("svc")?;

    let b = modules.module("b");
    b.uses(["a"]);
    let from_b = b.get("svc")?;

    assert!(!Arc::ptr_eq(&from_a, &from_b));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn app_start_injects_its_container() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let seen: Arc<Mutex<Option<Container>>> = Arc::default();
    let runs = Arc::new(AtomicUsize::new(0));

    let sink = seen.clone();
    let counter = runs.clone();
    modules.app("x").on_start(inject!(|context: Container| {
        counter.fetch_add(1, Ordering::SeqCst);
        *sink.lock().unwrap() = Some((*context).clone());
    }))?;

    modules.app("x").start()?;
    modules.app("x").start()?;

    let app = modules.app("x");
    let context = seen.lock().unwrap().clone().expect("start callback ran");
    assert!(Container::ptr_eq(&context, app.container()));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(app.is_started());
    Ok(())
}

#[test]
fn config_runs_in_dependency_order() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let log: Log = Arc::default();

    modules.module("a").config(record(&log));
    modules.module("b").uses(["a"]).config(record(&log));
    modules.module("c").config(record(&log));

    let app = modules.app("app");
    app.uses(["b", "c"]).config(record(&log));
    let done = log.clone();
    app.on_start(Injectable::new(Vec::<String>::new(), move |_: &mut Module, _: &Args| {
        done.lock().unwrap().push("start".to_string());
    }))?;
    app.start()?;

    assert_eq!(entries(&log), vec!["a", "b", "c", "app", "start"]);
    Ok(())
}

#[test]
fn modules_may_be_defined_after_use() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let app = modules.app("late");
    app.uses(["tools"]);

    let tools = modules.module("tools");
    tools.register_value("hammer", 3u8);
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = seen.clone();
    tools.config(inject!(|hammer: u8| {
        sink.store(*hammer as usize, Ordering::SeqCst);
    }));

    assert!(!app.contains("hammer"));
    app.start()?;
    assert!(app.contains("hammer"));
    assert_eq!(seen.load(Ordering::SeqCst), 3);
    Ok(())
}

#[test]
fn config_sees_the_whole_app_registry() -> Result<(), WiringError> {
    let modules = Registrar::new();
    modules.module("storage").register_value("db", String::from("pg"));
    let seen: Arc<Mutex<Option<String>>> = Arc::default();
    let sink = seen.clone();
    // "reports" never uses "storage" but is configured through the app container
    modules.module("reports").config(inject!(|db: String| {
        *sink.lock().unwrap() = Some(db.to_string());
    }));

    modules.app("site").uses(["reports", "storage"]).start()?;

    assert_eq!(seen.lock().unwrap().as_deref(), Some("pg"));
    Ok(())
}

#[test]
fn missing_module_fails_at_start() {
    let modules = Registrar::new();
    let app = modules.app("broken");
    app.uses(["ghost"]);

    match app.start() {
        Err(WiringError::MissingOrInvalidModuleUse(name)) => assert_eq!(name, "ghost"),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(!app.is_started());
}

#[test]
fn apps_cannot_be_used_as_modules() {
    let modules = Registrar::new();
    modules.app("other");
    let app = modules.app("main");
    app.uses(["other"]);

    assert!(matches!(
        app.start(),
        Err(WiringError::MissingOrInvalidModuleUse(name)) if name == "other"
    ));
}

#[test]
fn module_use_cycles_are_tolerated() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let log: Log = Arc::default();
    modules.module("a").uses(["b"]).config(record(&log));
    modules.module("b").uses(["a"]).config(record(&log));
    modules.app("app").uses(["a", "b", "a"]).start()?;

    assert_eq!(entries(&log), vec!["b", "a"]);
    Ok(())
}

#[test]
fn construct_registers_its_result() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let ui = modules.module("ui");
    ui.construct(
        "widget",
        Construct::new(inject!(|| instance(Shape::new(|ctor, _name| Some(Provider::Factory(ctor)))))),
    );

    let ctor = Constructor::with_prototype(Widget::default, inject!(|| ()));
    assert!(ui.build("widget", "foo", ctor)?.is_factory());

    let foo = ui.get_as::<Widget>("foo")?;
    assert!(foo.label.is_empty());
    Ok(())
}

#[test]
fn construct_creator_is_injected_with_the_module() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let ui = modules.module("ui");
    ui.register_value("prefix", String::from("ui-"));
    ui.construct(
        "labelled",
        Construct::new(Injectable::new(["prefix"], |module: &mut Module, args: &Args| -> Result<Instance, WiringError> {
            let prefix = args.get::<String>("prefix")?;
            let owner = module.name().to_string();
            Ok(instance(Shape::new(move |_, name| {
                Some(Provider::value(Widget {
                    label: format!("{}{}@{}", prefix, name, owner),
                }))
            })))
        })),
    );

    ui.build_empty("labelled", "button")?;
    assert_eq!(ui.get_as::<Widget>("button")?.label, "ui-button@ui");
    Ok(())
}

#[test]
fn constructs_are_inherited_through_use() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let lib = modules.module("lib");
    lib.construct("widget", Construct::returning(Shape::identity()));
    lib.construct("panel", Construct::returning(Shape::identity()));

    let page = modules.module("page");
    page.construct("panel", Construct::returning(Shape::new(|_, _| Some(Provider::value(1u8)))));
    page.uses(["lib"]);
    assert_eq!(page.constructs(), vec!["panel", "service", "widget"]);

    page.build("widget", "w", Constructor::with_prototype(Widget::default, inject!(|| ())))?;
    page.build_empty("panel", "p")?;
    assert!(page.get_as::<Widget>("w").is_ok());
    assert_eq!(*page.get_as::<u8>("p")?, 1);
    Ok(())
}

#[test]
fn service_construct_is_builtin() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let m = modules.module("m");
    m.register_value("n", 4u8);
    m.service("double", Constructor::new(inject!(|n: u8| instance(*n * 2))))?;

    assert_eq!(*m.get_as::<u8>("double")?, 8);
    Ok(())
}

#[test]
fn construct_returning_nothing_fails() {
    let modules = Registrar::new();
    let m = modules.module("m");
    m.construct("void", Construct::returning(Shape::new(|_, _| None)));
    m.construct("silent", Construct::new(inject!(|| ())));

    assert!(matches!(
        m.build_empty("void", "thing"),
        Err(WiringError::ConstructReturnedNothing(name)) if name == "thing"
    ));
    assert!(matches!(m.build_empty("silent", "thing"), Err(WiringError::ConstructReturnedNothing(_))));
    assert!(matches!(m.build_empty("absent", "thing"), Err(WiringError::UnknownConstruct(_))));
    assert!(!m.contains("thing"));
}

#[test]
fn only_apps_start() {
    let modules = Registrar::new();
    let m = modules.module("m");

    assert!(matches!(m.start(), Err(WiringError::NotAnApp(name)) if name == "m"));
    assert!(matches!(m.on_start(inject!(|| ())), Err(WiringError::NotAnApp(_))));
}

#[test]
fn globals_are_shared_across_apps() -> Result<(), WiringError> {
    let modules = Registrar::new();
    modules.app("first").config(inject!(|globals: Globals| {
        globals.set("theme", instance(String::from("dark")));
    }));
    modules.app("first").start()?;

    let seen: Arc<Mutex<Option<String>>> = Arc::default();
    let sink = seen.clone();
    let second = modules.app("second");
    second.on_start(inject!(|globals: Globals| {
        *sink.lock().unwrap() = Some(globals.get_as::<String>("theme")?.to_string());
    }))?;
    second.start()?;

    assert_eq!(seen.lock().unwrap().as_deref(), Some("dark"));
    assert!(modules.globals().contains("theme"));
    Ok(())
}

#[test]
fn context_and_globals_are_not_merged() -> Result<(), WiringError> {
    let modules = Registrar::with_config(RegistrarConfig::default().reserve("secret"));
    modules.module("lib").register_value("secret", 1u8).register_value("open", 2u8);
    let app = modules.app("app");
    app.uses(["lib"]).start()?;

    assert!(!app.contains("secret"));
    assert!(app.contains("open"));
    let context = app.get_as::<Container>(CONTEXT)?;
    assert!(Container::ptr_eq(&context, app.container()));
    assert!(!modules.module("lib").contains(CONTEXT));
    Ok(())
}

#[test]
fn app_call_uses_the_app_as_receiver() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let app = modules.app("site");
    app.register_value("n", 5u8);

    let method = Injectable::new(["n"], |module: &mut Module, args: &Args| -> Result<Instance, WiringError> {
        Ok(instance(format!("{}:{}", module.name(), args.get::<u8>("n")?)))
    });
    let result = app.call(&method)?.expect("a value");
    assert_eq!(result.downcast_ref::<String>().map(String::as_str), Some("site:5"));

    let lib = modules.module("lib");
    lib.register_value("n", 1u8);
    assert!(matches!(lib.call(&method), Err(WiringError::NotAnApp(name)) if name == "lib"));
    Ok(())
}

#[test]
fn failed_bootstrap_can_be_retried() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let ready = Arc::new(AtomicUsize::new(0));
    let starts = Arc::new(AtomicUsize::new(0));

    let flag = ready.clone();
    modules.module("db").config(inject!(|| {
        if flag.load(Ordering::SeqCst) == 0 {
            Err(WiringError::Config("db offline".into()))
        } else {
            Ok(())
        }
    }));
    let counter = starts.clone();
    let app = modules.app("app");
    app.uses(["db"]).on_start(inject!(|| {
        counter.fetch_add(1, Ordering::SeqCst);
    }))?;

    assert!(matches!(app.start(), Err(WiringError::Config(_))));
    assert!(!app.is_started());
    assert_eq!(starts.load(Ordering::SeqCst), 0);

    ready.store(1, Ordering::SeqCst);
    app.start()?;
    app.start()?;
    assert!(app.is_started());
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn start_from_a_callback_is_ignored() -> Result<(), WiringError> {
    let modules = Registrar::new();
    let starts = Arc::new(AtomicUsize::new(0));
    let counter = starts.clone();
    let app = modules.app("app");
    app.config(Injectable::new(Vec::<String>::new(), |module: &mut Module, _: &Args| {
        assert!(!module.is_started());
        module.start().map(|_| ())
    }));
    app.on_start(inject!(|| {
        counter.fetch_add(1, Ordering::SeqCst);
    }))?;

    app.start()?;
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn clear_forgets_modules() {
    let modules = Registrar::new();
    let before = modules.module("a");
    modules.clear();

    assert!(!modules.contains("a"));
    assert!(!Module::ptr_eq(&before, &modules.module("a")));
}
