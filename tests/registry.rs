//! Process-wide registry behaviour. Kept to a single test: the registry is
//! shared by every test in this binary.

use dombridge::{ContextConfig, ExecutingContext, ReferenceEngine, ScriptValue, registry};
use std::cell::RefCell;
use std::rc::Rc;

fn new_context() -> ExecutingContext {
    ExecutingContext::with_reference_engine(ContextConfig::default()).unwrap()
}

#[test]
fn test_registry_lifecycle() {
    registry::init();
    registry::init();
    assert!(registry::is_initialized());
    assert_eq!(registry::live_context_count(), 0);

    // Plugins run in every context created after registration
    let mut compiler = new_context();
    let plugin = compiler
        .dump_bytecode("let pluginVersion = 1\nfunction pluginHello() { return 'hello' }", "plugin.js")
        .unwrap();
    registry::register_plugin_bytecode("hello", plugin);
    registry::register_plugin_bytecode("broken", b"not bytecode".to_vec());
    assert_eq!(registry::plugin_bytecodes().len(), 2);

    let mut ctx = new_context();
    assert_eq!(ctx.evaluate("pluginHello()", "", 1).unwrap(), ScriptValue::string("hello"));
    assert_eq!(compiler.evaluate("typeof pluginHello", "", 1).unwrap(), ScriptValue::string("undefined"));
    assert_eq!(registry::live_context_count(), 2);

    // Plugin failures reach an exception handler installed at creation
    let throwing = compiler.dump_bytecode("throw 'plugin failed'", "throwing.js").unwrap();
    registry::register_plugin_bytecode("throwing", throwing);
    let failures = Rc::new(RefCell::new(Vec::new()));
    let sink = failures.clone();
    let observed = ExecutingContext::with_exception_handler(
        Box::new(ReferenceEngine::default()),
        ContextConfig::default(),
        move |_, error| sink.borrow_mut().push(error.message.clone()),
    )
    .unwrap();
    assert_eq!(failures.borrow().len(), 2);
    assert!(failures.borrow().iter().any(|m| m == "plugin failed"));
    drop(observed);
    assert!(registry::unregister_plugin_bytecode("throwing"));

    // Re-registering under a name replaces the blob
    let upgraded = compiler.dump_bytecode("let pluginVersion = 2", "plugin.js").unwrap();
    registry::register_plugin_bytecode("hello", upgraded);
    assert_eq!(registry::plugin_bytecodes().len(), 2);
    let mut upgraded_ctx = new_context();
    assert_eq!(upgraded_ctx.evaluate("pluginVersion", "", 1).unwrap(), ScriptValue::number(2.0));
    drop(upgraded_ctx);

    assert!(registry::unregister_plugin_bytecode("broken"));
    assert!(!registry::unregister_plugin_bytecode("broken"));
    assert_eq!(registry::plugin_bytecodes().len(), 1);

    // Disposal invalidates the id
    let id = ctx.context_id();
    assert!(registry::is_context_valid(id));
    ctx.dispose();
    assert!(!registry::is_context_valid(id));
    assert_eq!(registry::live_context_count(), 1);

    // Teardown forgets everything; surviving contexts keep working
    registry::teardown();
    assert!(!registry::is_initialized());
    assert!(registry::plugin_bytecodes().is_empty());
    assert!(!registry::is_context_valid(compiler.context_id()));
    assert_eq!(compiler.evaluate("1 + 1", "", 1).unwrap(), ScriptValue::number(2.0));

    // Creating a context initializes again; ids are never reused
    let mut fresh = new_context();
    assert!(registry::is_initialized());
    assert!(fresh.context_id() > compiler.context_id());
    assert_eq!(registry::live_context_count(), 1);
    assert_eq!(fresh.evaluate("typeof pluginHello", "", 1).unwrap(), ScriptValue::string("undefined"));
}
