//! Fixtures shared by the unit tests.

use crate::{
    metadata::token::Token,
    runtime::{
        AppDomainRc, Assembly, AssemblyRc, LoadContext, MethodDescRc, MethodTable, MethodTableRc,
        Module, ModuleId, ModuleRc, Runtime, TypeHandle,
    },
};

// Helper function to create a type argument `Int32`
pub fn int32() -> TypeHandle {
    MethodTable::new(Token::type_def(0x10), ModuleId::next(), "Int32", 0).into()
}

// Helper function to create a type argument `String`
pub fn string() -> TypeHandle {
    MethodTable::new(Token::type_def(0x11), ModuleId::next(), "String", 0).into()
}

/// A module defining one method of every genericity:
///
/// - `Program::Main` (0x06000010) - not generic
/// - `Program::Convert<T>` (0x06000011) - generic method
/// - `Program::Parse<T>` (0x06000012) - generic method, same shape as `Convert`
/// - `List<T>::Add` (0x06000013) - generic type
/// - `Dictionary<K, V>::Select<R>` (0x06000014) - generic type and method
pub struct GenericFixture {
    pub module: ModuleRc,
    pub program: MethodTableRc,
    pub main: MethodDescRc,
    pub convert: MethodDescRc,
    pub parse: MethodDescRc,
    pub list: MethodTableRc,
    pub add: MethodDescRc,
    pub dictionary: MethodTableRc,
    pub select: MethodDescRc,
}

impl GenericFixture {
    pub fn new() -> Self {
        Self::in_module(Module::new("App.dll"))
    }

    pub fn in_module(module: ModuleRc) -> Self {
        let program = module.define_type(Token::type_def(2), "Program", 0).unwrap();
        let list = module.define_type(Token::type_def(3), "List", 1).unwrap();
        let dictionary = module
            .define_type(Token::type_def(4), "Dictionary", 2)
            .unwrap();

        let main = module
            .define_method(&program, Token::method_def(0x10), "Main", 0)
            .unwrap();
        let convert = module
            .define_method(&program, Token::method_def(0x11), "Convert", 1)
            .unwrap();
        let parse = module
            .define_method(&program, Token::method_def(0x12), "Parse", 1)
            .unwrap();
        let add = module
            .define_method(&list, Token::method_def(0x13), "Add", 0)
            .unwrap();
        let select = module
            .define_method(&dictionary, Token::method_def(0x14), "Select", 1)
            .unwrap();

        GenericFixture {
            module,
            program,
            main,
            convert,
            parse,
            list,
            add,
            dictionary,
            select,
        }
    }
}

/// A runtime with one domain, and one assembly `App` loaded into it that contains the
/// [`GenericFixture`] module.
pub struct Scope {
    pub runtime: Runtime,
    pub domain: AppDomainRc,
    pub assembly: AssemblyRc,
    pub fixture: GenericFixture,
}

impl Scope {
    pub fn new() -> Self {
        let runtime = Runtime::new();
        let domain = runtime.create_domain("Default");
        let assembly = Assembly::new("App");
        let fixture = GenericFixture::new();
        assembly.add_module(fixture.module.clone()).unwrap();
        domain.load(assembly.clone(), LoadContext::Execution);

        Scope {
            runtime,
            domain,
            assembly,
            fixture,
        }
    }
}
