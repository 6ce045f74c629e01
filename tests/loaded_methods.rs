//! Integration tests for the loaded method traversal.
//!
//! Each test builds a small runtime by hand (domains, assemblies, modules and their
//! instantiation tables) and checks which methods a `LoadedMethodIterator` reports.

use std::{collections::HashSet, sync::Arc};

use jitscope::prelude::*;

/// Definitions shared by the tests, all living in one module.
struct Definitions {
    module: ModuleRc,
    program: MethodTableRc,
    main: MethodDescRc,
    list: MethodTableRc,
    add: MethodDescRc,
    dictionary: MethodTableRc,
    select: MethodDescRc,
    int32: MethodTableRc,
    string: MethodTableRc,
}

impl Definitions {
    fn new(module: ModuleRc) -> Self {
        let program = module.define_type(Token::type_def(2), "Program", 0).unwrap();
        let list = module.define_type(Token::type_def(3), "List", 1).unwrap();
        let dictionary = module.define_type(Token::type_def(4), "Dictionary", 2).unwrap();
        let int32 = module.define_type(Token::type_def(5), "Int32", 0).unwrap();
        let string = module.define_type(Token::type_def(6), "String", 0).unwrap();

        let main = module
            .define_method(&program, Token::new(0x0600_0010), "Main", 0)
            .unwrap();
        let add = module
            .define_method(&list, Token::method_def(0x11), "Add", 0)
            .unwrap();
        let select = module
            .define_method(&dictionary, Token::method_def(0x12), "Select", 1)
            .unwrap();

        Definitions {
            module,
            program,
            main,
            list,
            add,
            dictionary,
            select,
            int32,
            string,
        }
    }

    fn int(&self) -> TypeHandle {
        self.int32.clone().into()
    }

    fn str(&self) -> TypeHandle {
        self.string.clone().into()
    }
}

/// One domain with a single loaded assembly `App` containing the definitions module
fn app_domain() -> (Runtime, AppDomainRc, AssemblyRc, Definitions) {
    let runtime = Runtime::new();
    let domain = runtime.create_domain("Default");
    let assembly = Assembly::new("App");
    let defs = Definitions::new(Module::new("App.dll"));
    assembly.add_module(defs.module.clone()).unwrap();
    domain.load(assembly.clone(), LoadContext::Execution);
    (runtime, domain, assembly, defs)
}

fn run(
    domain: &AppDomain,
    module: &ModuleRc,
    token: Token,
    options: IterationOptions,
) -> Vec<MethodDescRc> {
    let mut iter = LoadedMethodIterator::start(domain, module, token, options).unwrap();
    let mut holder = KeepAliveGuard::default();
    let mut methods = Vec::new();
    while iter.advance(&mut holder) {
        methods.push(iter.current());
    }
    methods
}

fn publish_type(module: &ModuleRc, mt: &MethodTableRc) {
    module
        .param_types()
        .insert(TypeInstEntry::Loaded(mt.clone().into()));
}

#[test]
fn non_generic_method_scenario() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    assert_eq!(defs.main.token.value(), 0x0600_0010);

    let mut iter = LoadedMethodIterator::start(
        &domain,
        &defs.module,
        defs.main.token,
        IterationOptions::default(),
    )
    .unwrap();
    let mut holder = KeepAliveGuard::default();

    assert!(iter.advance(&mut holder));
    assert!(Arc::ptr_eq(&iter.current(), &defs.main));
    assert!(!iter.advance(&mut holder));
    assert!(!iter.advance(&mut holder));
    assert!(!iter.advance(&mut holder));
}

#[test]
fn non_generic_method_in_every_mode() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    for options in [
        IterationOptions::shared(),
        IterationOptions::unshared(),
        IterationOptions::all_domains(),
    ] {
        let methods = run(&domain, &defs.module, defs.main.token, options);
        assert_eq!(methods.len(), 1, "{:?}", options.mode);
        assert!(Arc::ptr_eq(&methods[0], &defs.main));
    }
}

#[test]
fn type_generic_scenario() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let list_int = defs.list.instantiate(vec![defs.int()]);
    let list_string = defs.list.instantiate(vec![defs.str()]);
    publish_type(&defs.module, &list_int);
    publish_type(&defs.module, &list_string);

    let mut iter = LoadedMethodIterator::start(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    )
    .unwrap();
    let mut holder = KeepAliveGuard::default();

    assert!(iter.advance(&mut holder));
    let first = iter.current();
    assert!(iter.advance(&mut holder));
    let second = iter.current();
    assert!(!iter.advance(&mut holder));

    assert!(first.is_owned_by(&list_int));
    assert!(second.is_owned_by(&list_string));
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.owner().unwrap().to_string(), "List<Int32>");
    assert_eq!(second.owner().unwrap().to_string(), "List<String>");
}

#[test]
fn type_generic_reports_each_instantiation_once() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let instantiations: Vec<MethodTableRc> = (0..8u32)
        .map(|index| {
            let arg = defs
                .module
                .define_type(Token::type_def(0x40 + index), &format!("Arg{index}"), 0)
                .unwrap();
            defs.list.instantiate(vec![arg.into()])
        })
        .collect();
    for mt in &instantiations {
        publish_type(&defs.module, mt);
        publish_type(&defs.module, mt);
    }
    // Same arguments as the first one, so the same instantiation
    publish_type(
        &defs.module,
        &defs.list.instantiate(instantiations[0].type_args.clone()),
    );
    assert_eq!(defs.module.param_types().len(), instantiations.len());

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), instantiations.len());

    let distinct: HashSet<*const MethodDesc> = methods.iter().map(Arc::as_ptr).collect();
    assert_eq!(distinct.len(), methods.len());
}

#[test]
fn fully_generic_method_yields_type_by_method_product() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let owners = [
        defs.dictionary.instantiate(vec![defs.int(), defs.str()]),
        defs.dictionary.instantiate(vec![defs.str(), defs.str()]),
        defs.dictionary.instantiate(vec![defs.int(), defs.int()]),
    ];
    for owner in &owners {
        publish_type(&defs.module, owner);
    }

    // Two method instantiations per owner, interleaved in the table
    let table = defs.module.inst_methods();
    for args in [defs.int(), defs.str()] {
        for owner in &owners {
            let method = defs.select.instantiate(owner, vec![args.clone()]).unwrap();
            table.insert(MethodInstEntry::Loaded(method));
        }
    }

    let methods = run(
        &domain,
        &defs.module,
        defs.select.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), owners.len() * 2);

    let distinct: HashSet<*const MethodDesc> = methods.iter().map(Arc::as_ptr).collect();
    assert_eq!(distinct.len(), methods.len());

    // Type-outer, method-inner
    for (index, method) in methods.iter().enumerate() {
        assert!(method.is_owned_by(&owners[index / 2]));
    }
    assert_eq!(methods[0].to_string(), "Dictionary<Int32,String>::Select<Int32>");
    assert_eq!(methods[1].to_string(), "Dictionary<Int32,String>::Select<String>");
}

#[test]
fn rejected_entries_are_never_reported() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let table = defs.module.param_types();

    table.reserve();
    table.insert(TypeInstEntry::Fixup(0x0040_2000));
    table.insert(TypeInstEntry::Loaded(
        TypeDesc::new(TypeDescKind::Array, "List<Int32>[]").into(),
    ));
    table.insert(TypeInstEntry::Loaded(
        defs.list.instantiate_unrestored(vec![defs.str()]).into(),
    ));
    table.insert(TypeInstEntry::Loaded(
        defs.dictionary
            .instantiate(vec![defs.int(), defs.int()])
            .into(),
    ));
    let valid = defs.list.instantiate(vec![defs.int()]);
    publish_type(&defs.module, &valid);

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&valid));
}

#[test]
fn each_rejection_category_independently() {
    for reason in [
        RejectReason::Placeholder,
        RejectReason::UnresolvedFixup,
        RejectReason::NonClassDescriptor,
        RejectReason::Unrestored,
        RejectReason::IdentityMismatch,
    ] {
        let (_runtime, domain, _assembly, defs) = app_domain();
        let entry = match reason {
            RejectReason::Placeholder => TypeInstEntry::Pending,
            RejectReason::UnresolvedFixup => TypeInstEntry::Fixup(0x2000),
            RejectReason::NonClassDescriptor => {
                TypeInstEntry::Loaded(TypeDesc::new(TypeDescKind::Pointer, "List*").into())
            }
            RejectReason::Unrestored => {
                TypeInstEntry::Loaded(defs.list.instantiate_unrestored(vec![defs.int()]).into())
            }
            RejectReason::IdentityMismatch => TypeInstEntry::Loaded(
                defs.dictionary
                    .instantiate(vec![defs.int(), defs.int()])
                    .into(),
            ),
        };
        defs.module.param_types().insert(entry);

        let methods = run(
            &domain,
            &defs.module,
            defs.add.token,
            IterationOptions::unshared(),
        );
        assert!(methods.is_empty(), "{} entry was reported", reason);
    }
}

#[test]
fn rejected_method_entries() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let owner = defs.dictionary.instantiate(vec![defs.int(), defs.str()]);
    publish_type(&defs.module, &owner);

    let table = defs.module.inst_methods();
    table.reserve();
    table.insert(MethodInstEntry::Loaded(
        defs.select
            .instantiate_unrestored(&owner, vec![defs.int()])
            .unwrap(),
    ));
    // An instantiation of an unrelated definition that shares the owner
    let other = defs
        .module
        .define_method(&defs.dictionary, Token::method_def(0x20), "Where", 1)
        .unwrap();
    let unrelated_owner = defs.dictionary.instantiate(vec![defs.int(), defs.str()]);
    table.insert(MethodInstEntry::Loaded(
        other.instantiate(&unrelated_owner, vec![defs.int()]).unwrap(),
    ));

    let methods = run(
        &domain,
        &defs.module,
        defs.select.token,
        IterationOptions::unshared(),
    );
    assert!(methods.is_empty());
}

#[test]
fn restoration_makes_entries_visible() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let pending = defs.list.instantiate_unrestored(vec![defs.int()]);
    publish_type(&defs.module, &pending);

    let options = IterationOptions::unshared();
    assert!(run(&domain, &defs.module, defs.add.token, options).is_empty());

    pending.restore();
    let methods = run(&domain, &defs.module, defs.add.token, options);
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&pending));
}

#[test]
fn published_placeholder_becomes_visible() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let table = defs.module.param_types();
    let slot = table.reserve();

    let options = IterationOptions::unshared();
    assert!(run(&domain, &defs.module, defs.add.token, options).is_empty());

    table
        .publish(
            slot,
            TypeInstEntry::Loaded(defs.list.instantiate(vec![defs.int()]).into()),
        )
        .unwrap();
    assert_eq!(run(&domain, &defs.module, defs.add.token, options).len(), 1);
}

#[test]
fn resource_modules_contribute_nothing() {
    let (_runtime, domain, assembly, defs) = app_domain();
    let resources = Module::new_resource("App.resources.dll");
    assembly.add_module(resources.clone()).unwrap();
    publish_type(&resources, &defs.list.instantiate(vec![defs.int()]));

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    assert!(methods.is_empty());
}

#[test]
fn instantiations_loaded_by_other_assemblies() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let consumer = Assembly::new("Consumer");
    let consumer_module = Module::new("Consumer.dll");
    consumer.add_module(consumer_module.clone()).unwrap();
    domain.load(consumer, LoadContext::Execution);

    let in_consumer = defs.list.instantiate(vec![defs.str()]);
    publish_type(&consumer_module, &in_consumer);

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&in_consumer));
}

#[test]
fn assembly_loaded_twice_is_visited_once() {
    let (_runtime, domain, assembly, defs) = app_domain();
    let list_int = defs.list.instantiate(vec![defs.int()]);
    publish_type(&defs.module, &list_int);

    assert!(!domain.load(assembly.clone(), LoadContext::Execution));
    assert_eq!(domain.assembly_count(), 1);

    for options in [IterationOptions::unshared(), IterationOptions::all_domains()] {
        let methods = run(&domain, &defs.module, defs.add.token, options);
        assert_eq!(methods.len(), 1, "{:?}", options.mode);
        assert!(methods[0].is_owned_by(&list_int));
    }
}

#[test]
fn instantiation_created_before_method_is_skipped() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let queue = defs
        .module
        .define_type(Token::type_def(0x30), "Queue", 1)
        .unwrap();
    let early = queue.instantiate(vec![defs.int()]);
    publish_type(&defs.module, &early);
    let enqueue = defs
        .module
        .define_method(&queue, Token::method_def(0x30), "Enqueue", 0)
        .unwrap();

    let mut iter = LoadedMethodIterator::start(
        &domain,
        &defs.module,
        enqueue.token,
        IterationOptions::unshared(),
    )
    .unwrap();
    let mut holder = KeepAliveGuard::default();
    assert!(!iter.advance(&mut holder));
    assert!(iter.try_current().is_none());

    let late = queue.instantiate(vec![defs.str()]);
    publish_type(&defs.module, &late);
    let methods = run(
        &domain,
        &defs.module,
        enqueue.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&late));
}

/// Runtime with a domain-neutral `mscorlib` defining the generic types, plus a per-domain
/// `App` that loaded its own instantiation.
fn shared_runtime() -> (
    Runtime,
    AppDomainRc,
    Definitions,
    ModuleRc,
    MethodTableRc,
    MethodTableRc,
) {
    let runtime = Runtime::new();
    let corlib = Assembly::new_domain_neutral("mscorlib");
    let defs = Definitions::new(Module::new("mscorlib.dll"));
    corlib.add_module(defs.module.clone()).unwrap();
    runtime.load_domain_neutral(corlib.clone()).unwrap();

    let domain = runtime.create_domain("Default");
    domain.load(corlib, LoadContext::Execution);

    let app = Assembly::new("App");
    let app_module = Module::new("App.dll");
    app.add_module(app_module.clone()).unwrap();
    domain.load(app, LoadContext::Execution);

    let in_corlib = defs.list.instantiate(vec![defs.str()]);
    publish_type(&defs.module, &in_corlib);
    let in_app = defs.list.instantiate(vec![defs.int()]);
    publish_type(&app_module, &in_app);

    (runtime, domain, defs, app_module, in_corlib, in_app)
}

#[test]
fn unshared_mode_skips_domain_neutral_assemblies() {
    let (_runtime, domain, defs, _app_module, _in_corlib, in_app) = shared_runtime();

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&in_app));
}

#[test]
fn all_domains_mode_includes_domain_neutral_assemblies() {
    let (_runtime, domain, defs, _app_module, in_corlib, in_app) = shared_runtime();

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::all_domains(),
    );
    assert_eq!(methods.len(), 2);
    assert!(methods[0].is_owned_by(&in_corlib));
    assert!(methods[1].is_owned_by(&in_app));
}

#[test]
fn shared_mode_requires_profiler_notification() {
    let (_runtime, domain, defs, _app_module, in_corlib, _in_app) = shared_runtime();

    let methods = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::shared(),
    );
    assert_eq!(methods.len(), 1);
    assert!(methods[0].is_owned_by(&in_corlib));

    defs.module.set_load_level(ModuleLoadLevel::Loading);
    assert!(run(&domain, &defs.module, defs.add.token, IterationOptions::shared()).is_empty());

    defs.module.set_load_level(ModuleLoadLevel::ProfilerNotified);
    assert_eq!(
        run(&domain, &defs.module, defs.add.token, IterationOptions::shared()).len(),
        1
    );
}

#[test]
fn unshared_mode_honours_custom_filters() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let late = Assembly::new("Late");
    let late_module = Module::new("Late.dll");
    late_module.set_load_level(ModuleLoadLevel::ProfilerNotified);
    late.add_module(late_module.clone()).unwrap();
    domain.load_with_state(late.clone(), LoadContext::Execution, AssemblyLoadState::Loading);
    publish_type(&late_module, &defs.list.instantiate(vec![defs.int()]));

    let token = defs.add.token;
    assert!(run(&domain, &defs.module, token, IterationOptions::unshared()).is_empty());

    let loading = AssemblyIterationFlags::default() | AssemblyIterationFlags::INCLUDE_LOADING;
    let options = IterationOptions::unshared()
        .with_assembly_flags(loading)
        .with_module_option(ModuleIterationOption::IncludeAvailableToProfilers);
    assert_eq!(run(&domain, &defs.module, token, options).len(), 1);

    domain.set_load_state(&late, AssemblyLoadState::Loaded).unwrap();
    assert!(run(&domain, &defs.module, token, IterationOptions::unshared()).is_empty());
    late_module.set_load_level(ModuleLoadLevel::Loaded);
    assert_eq!(run(&domain, &defs.module, token, IterationOptions::unshared()).len(), 1);
}

#[test]
fn custom_filters_outside_unshared_mode_are_rejected() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let flags = AssemblyIterationFlags::default() | AssemblyIterationFlags::INCLUDE_LOADING;

    for options in [
        IterationOptions::shared().with_assembly_flags(flags),
        IterationOptions::all_domains().with_assembly_flags(flags),
        IterationOptions::all_domains().with_module_option(ModuleIterationOption::IncludeLoading),
    ] {
        assert!(matches!(
            LoadedMethodIterator::start(&domain, &defs.module, defs.add.token, options),
            Err(Error::UnsupportedConfiguration(_))
        ));
    }
}

#[test]
fn unresolvable_token_is_an_empty_traversal() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    let methods = run(
        &domain,
        &defs.module,
        Token::method_def(0x00FF_FFFF),
        IterationOptions::unshared(),
    );
    assert!(methods.is_empty());

    assert!(matches!(
        LoadedMethodIterator::start(
            &domain,
            &defs.module,
            defs.program.token,
            IterationOptions::unshared()
        ),
        Err(Error::InvalidToken(_))
    ));
}

#[test]
fn iterator_adapter_matches_manual_driving() {
    let (_runtime, domain, _assembly, defs) = app_domain();
    publish_type(&defs.module, &defs.list.instantiate(vec![defs.int()]));
    publish_type(&defs.module, &defs.list.instantiate(vec![defs.str()]));

    let manual = run(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    );
    let adapted: Vec<MethodDescRc> = LoadedMethodIterator::start(
        &domain,
        &defs.module,
        defs.add.token,
        IterationOptions::unshared(),
    )
    .unwrap()
    .into_methods()
    .map(|loaded| loaded.method)
    .collect();

    assert_eq!(manual.len(), adapted.len());
    for (left, right) in manual.iter().zip(&adapted) {
        assert!(Arc::ptr_eq(left, right));
    }
}
