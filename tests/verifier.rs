use jvm_verifier::jvm::class_graph::{ClassData, ClassGraph, ClassGraphArenas, ClassId, MethodData};
use jvm_verifier::jvm::verifier::{
    verify_method, MethodAnalysis, ResolutionMode, Settings, VerificationType,
};
use jvm_verifier::jvm::Instruction::*;
use jvm_verifier::jvm::*;

/// Methods under test all belong to a single class, `me/alec/Test`
struct Harness<'g> {
    /// Class hierarchy the methods are verified against
    graph: ClassGraph<'g>,

    /// Class owning the methods, along with its constant pool
    class: ClassInfo<ClassId<'g>>,

    settings: Settings,
}

impl<'g> Harness<'g> {
    pub fn new(arenas: &'g ClassGraphArenas<'g>) -> Harness<'g> {
        let _ = env_logger::builder().is_test(true).try_init();

        let graph = ClassGraph::new(arenas);
        let this_class = graph.add_class(ClassData::new(
            BinaryName::from_string(String::from("me/alec/Test")).unwrap(),
            graph.java.object,
            ClassAccessFlags::PUBLIC,
            vec![],
        ));
        Harness {
            graph,
            class: ClassInfo {
                this_class,
                major_version: 52,
                constants: ConstantPool::new(),
            },
            settings: Settings::new(),
        }
    }

    pub fn this_class(&self) -> ClassId<'g> {
        self.class.this_class
    }

    pub fn add_class(&self, name: &str, superclass: ClassId<'g>) -> ClassId<'g> {
        self.graph.add_class(ClassData::new(
            BinaryName::from_string(String::from(name)).unwrap(),
            superclass,
            ClassAccessFlags::PUBLIC,
            vec![],
        ))
    }

    /// Declare a method on some class and add a reference to it into the constant pool
    pub fn add_method_ref(
        &mut self,
        class: ClassId<'g>,
        name: UnqualifiedName,
        descriptor: &str,
        access_flags: MethodAccessFlags,
    ) -> u16 {
        let descriptor = self.graph.parse_method_descriptor(descriptor).unwrap();
        self.graph.add_method(MethodData {
            class,
            name: name.clone(),
            descriptor: descriptor.clone(),
            access_flags,
        });
        let method_ref = self
            .graph
            .method_ref(RefType::Object(class), name, descriptor);
        self.class.constants.push(Constant::MethodRef(method_ref))
    }

    /// Add a class reference into the constant pool
    pub fn add_class_ref(&mut self, class: ClassId<'g>) -> u16 {
        self.class
            .constants
            .push(Constant::Class(RefType::Object(class)))
    }

    pub fn method(
        &self,
        name: &str,
        descriptor: &str,
        access_flags: MethodAccessFlags,
        code: Code,
    ) -> MethodInfo<ClassId<'g>> {
        MethodInfo {
            name: UnqualifiedName::from_string(String::from(name)).unwrap(),
            descriptor: self.graph.parse_method_descriptor(descriptor).unwrap(),
            access_flags,
            code,
        }
    }

    pub fn verify(
        &self,
        method: &mut MethodInfo<ClassId<'g>>,
    ) -> Result<MethodAnalysis<ClassId<'g>>, Error> {
        verify_method(&self.graph, &self.class, method, &self.settings)
    }
}

const STATIC: MethodAccessFlags = MethodAccessFlags::STATIC;

#[test]
fn ints_from_both_branches_merge() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    // static int pick(boolean flag) { int x; if (flag) x = 1; else x = 2; return x; }
    let code = Code::new(
        1,
        2,
        vec![
            ILoad(0),
            If(OrdComparison::EQ, 8),
            IConst(1),
            IStore(1),
            Goto(5),
            IConst(2),
            IStore(1),
            ILoad(1),
            IReturn,
        ],
    );
    let mut method = harness.method("pick", "(Z)I", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();

    assert_eq!(analysis.local_type(7, 1), Some(VerificationType::Integer));
    assert_eq!(analysis.stack_height(1), Some(1));
    assert_eq!(analysis.stack_height(7), Some(0));
    assert_eq!(analysis.stack_slot(8, 0), Some(VerificationType::Integer));
    assert!(analysis.is_branch_target(5));
    assert!(analysis.is_branch_target(7));
    assert!(!analysis.is_branch_target(2));
    assert!((0..9).all(|index| analysis.is_reachable(index)));

    // Both stores feed the same load, so they are one variable
    let x = analysis.local_var(7).unwrap();
    assert_eq!((x.local, x.ty, x.is_arg), (1, VerificationType::Integer, false));
    assert_eq!(analysis.local_var(3), Some(x));
    assert_eq!(analysis.local_var(6), Some(x));
    assert_eq!(analysis.all_local_vars().len(), 2);
}

#[test]
fn objects_from_both_branches_join_to_common_superclass() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);
    let animal = harness.add_class("zoo/Animal", harness.graph.java.object);
    harness.add_class("zoo/Dog", animal);
    harness.add_class("zoo/Cat", animal);

    let code = Code::new(
        1,
        4,
        vec![
            ILoad(0),
            If(OrdComparison::EQ, 8),
            ALoad(1),
            AStore(3),
            Goto(5),
            ALoad(2),
            AStore(3),
            ALoad(3),
            AReturn,
        ],
    );
    let mut method = harness.method("pick", "(ZLzoo/Dog;Lzoo/Cat;)Lzoo/Animal;", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();

    let animal = VerificationType::object(animal);
    assert_eq!(analysis.local_type(7, 3), Some(animal));
    assert_eq!(analysis.stack_slot(8, 0), Some(animal));
    assert_eq!(analysis.local_var(7).map(|var| var.ty), Some(animal));
}

#[test]
fn subroutine_returns_restore_caller_locals() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    // The subroutine stores into slot 4 but never touches slot 5, which holds a different type
    // at each call site
    let code = Code::new(
        1,
        6,
        vec![
            IConst(1),  // 0
            IStore(5),  // 1
            AConstNull, // 3
            AStore(4),  // 4
            Jsr(10),    // 6
            FConst(1.0), // 9
            FStore(5),  // 10
            Jsr(4),     // 12
            Return,     // 15
            AStore(3),  // 16
            IConst(0),  // 17
            IStore(4),  // 18
            Ret(3),     // 20
        ],
    );
    let mut method = harness.method("run", "()V", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();

    // After the first call
    assert_eq!(analysis.local_type(5, 5), Some(VerificationType::Integer));
    assert_eq!(analysis.local_type(5, 4), Some(VerificationType::Integer));

    // After the second call
    assert_eq!(analysis.local_type(8, 5), Some(VerificationType::Float));
    assert_eq!(analysis.local_type(8, 4), Some(VerificationType::Integer));

    // Inside the subroutine, slot 5 is unusable
    assert_eq!(analysis.local_type(9, 5), Some(VerificationType::Invalid));
    assert_eq!(analysis.stack_slot(9, 0), Some(VerificationType::Ret(9)));

    assert!(analysis.is_reachable(8));
    assert!(analysis.is_branch_target(5));
    assert!(analysis.is_branch_target(8));
    assert!(analysis.is_branch_target(9));
}

#[test]
fn stack_overflow_reports_the_pushing_instruction() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    let code = Code::new(1, 0, vec![IConst(1), IConst(2), Pop, Pop, Return]);
    let mut method = harness.method("run", "()V", STATIC, code);
    let err = harness.verify(&mut method).unwrap_err();

    assert!(matches!(
        err,
        Error::Verification {
            kind: VerifyErrorKind::StackOverflow,
            offset: 1,
            instruction: "iconst",
            ..
        }
    ));
}

#[test]
fn constructors_must_call_super() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    let object = harness.graph.java.object;
    let super_init = harness.add_method_ref(
        object,
        UnqualifiedName::INIT,
        "()V",
        MethodAccessFlags::PUBLIC,
    );
    let public = MethodAccessFlags::PUBLIC;

    let code = Code::new(1, 1, vec![Return]);
    let mut method = harness.method("<init>", "()V", public, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::BaseConstructorNotCalled,
            offset: 0,
            ..
        })
    ));

    // Only one path calls the superclass constructor
    let code = Code::new(
        1,
        2,
        vec![
            ILoad(1),
            If(OrdComparison::EQ, 7),
            ALoad(0),
            Invoke(InvokeType::Special, super_init),
            Return,
        ],
    );
    let mut method = harness.method("<init>", "(Z)V", public, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::BaseConstructorNotCalled,
            offset: 8,
            instruction: "return",
            ..
        })
    ));

    let code = Code::new(
        1,
        1,
        vec![ALoad(0), Invoke(InvokeType::Special, super_init), Return],
    );
    let mut method = harness.method("<init>", "()V", public, code);
    let analysis = harness.verify(&mut method).unwrap();
    assert_eq!(
        analysis.raw_stack_slot(1, 0),
        Some(VerificationType::UninitializedThis)
    );
    assert_eq!(
        analysis.local_type(2, 0),
        Some(VerificationType::object(harness.this_class()))
    );
}

#[test]
fn incompatible_stores_make_separate_variables() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    let code = Code::new(
        1,
        2,
        vec![
            IConst(1),
            IStore(1),
            ILoad(1),
            Pop,
            FConst(1.0),
            FStore(1),
            FLoad(1),
            Pop,
            Return,
        ],
    );
    let mut method = harness.method("run", "()V", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();

    let int_var = analysis.local_var(2).unwrap();
    let float_var = analysis.local_var(6).unwrap();
    assert_eq!((int_var.local, int_var.ty), (1, VerificationType::Integer));
    assert_eq!((float_var.local, float_var.ty), (1, VerificationType::Float));
    assert_ne!(int_var, float_var);
    assert_eq!(analysis.local_var(1), Some(int_var));
    assert_eq!(analysis.local_var(5), Some(float_var));
    assert_eq!(analysis.all_local_vars().len(), 2);
}

#[test]
fn missing_methods_become_deferred_errors() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    let this_class = harness.this_class();

    // Reference a method which was never declared
    let descriptor = harness.graph.parse_method_descriptor("()V").unwrap();
    let method_ref = harness.graph.method_ref(
        RefType::Object(this_class),
        UnqualifiedName::from_string(String::from("vanish")).unwrap(),
        descriptor,
    );
    let vanish = harness.class.constants.push(Constant::MethodRef(method_ref));

    let code = Code::new(0, 0, vec![Invoke(InvokeType::Static, vanish), Return]);
    let mut method = harness.method("run", "()V", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();

    match &method.code.instructions[0].op {
        Op::Deferred {
            kind: HardErrorKind::NoSuchMethod,
            message_id,
            ..
        } => assert!(analysis.error_message(*message_id).is_some()),
        other => panic!("expected a deferred NoSuchMethodError, got {:?}", other),
    }
    assert!(!analysis.is_reachable(1));

    harness.settings.fail_on_deferred_errors = true;
    let code = Code::new(0, 0, vec![Invoke(InvokeType::Static, vanish), Return]);
    let mut method = harness.method("run", "()V", STATIC, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::DeferredFailure {
            kind: HardErrorKind::NoSuchMethod,
            ..
        })
    ));
}

#[test]
fn uninitialized_objects_cannot_cross_back_edges() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    let this_class = harness.this_class();
    let test_class = harness.add_class_ref(this_class);

    // Loops around with the freshly allocated object still in local 1
    let code = Code::new(1, 2, vec![New(test_class), AStore(1), Goto(-4)]);
    let mut method = harness.method("spin", "()V", STATIC, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::UninitializedLocal,
            offset: 4,
            instruction: "goto",
            ..
        })
    ));
}

#[test]
fn initializer_must_match_allocated_class() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    let animal = harness.add_class("zoo/Animal", harness.graph.java.object);
    let dog = harness.add_class("zoo/Dog", animal);
    let cat = harness.add_class("zoo/Cat", animal);
    let dog_class = harness.add_class_ref(dog);
    let dog_init = harness.add_method_ref(
        dog,
        UnqualifiedName::INIT,
        "()V",
        MethodAccessFlags::PUBLIC,
    );
    let cat_init = harness.add_method_ref(
        cat,
        UnqualifiedName::INIT,
        "()V",
        MethodAccessFlags::PUBLIC,
    );
    let adopt = |init: u16| {
        Code::new(
            2,
            0,
            vec![
                New(dog_class),
                Dup,
                Invoke(InvokeType::Special, init),
                AReturn,
            ],
        )
    };

    let mut method = harness.method("adopt", "()Lzoo/Animal;", STATIC, adopt(cat_init));
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::WrongInitializer,
            offset: 4,
            instruction: "invokespecial",
            ..
        })
    ));

    let mut method = harness.method("adopt", "()Lzoo/Animal;", STATIC, adopt(dog_init));
    let analysis = harness.verify(&mut method).unwrap();
    assert_eq!(
        analysis.stack_slot(3, 0),
        Some(VerificationType::object(dog))
    );
}

#[test]
fn subroutines_cannot_recurse() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    let code = Code::new(
        1,
        2,
        vec![
            Jsr(3),    // 0
            AStore(1), // 3
            Jsr(-1),   // 4
        ],
    );
    let mut method = harness.method("run", "()V", STATIC, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::RecursiveSubroutine,
            offset: 4,
            instruction: "jsr",
            ..
        })
    ));
}

#[test]
fn ret_outside_of_its_subroutine() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    // Once the subroutine has returned, its return address is still in local 1
    let code = Code::new(
        1,
        2,
        vec![
            Jsr(5),    // 0
            Ret(1),    // 3
            AStore(1), // 5
            Ret(1),    // 6
        ],
    );
    let mut method = harness.method("run", "()V", STATIC, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::InactiveSubroutine,
            offset: 3,
            instruction: "ret",
            ..
        })
    ));
}

#[test]
fn stack_heights_must_agree_at_joins() {
    let arenas = ClassGraphArenas::new();
    let harness = Harness::new(&arenas);

    // One path reaches the `return` with an extra int on the stack
    let code = Code::new(
        1,
        1,
        vec![ILoad(0), If(OrdComparison::EQ, 4), IConst(1), Return],
    );
    let mut method = harness.method("run", "(Z)V", STATIC, code);
    assert!(matches!(
        harness.verify(&mut method),
        Err(Error::Verification {
            kind: VerifyErrorKind::InconsistentStackHeight(_, _),
            ..
        })
    ));
}

#[test]
fn dynamic_resolution_of_constructor_calls() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    harness.settings.resolution = ResolutionMode::Dynamic;

    let base = harness
        .graph
        .add_unloadable(BinaryName::from_string(String::from("gone/Base")).unwrap());
    let base_class = harness.add_class_ref(base);
    let void = harness.graph.parse_method_descriptor("()V").unwrap();
    let base_init = harness.class.constants.push(Constant::MethodRef(
        harness
            .graph
            .method_ref(RefType::Object(base), UnqualifiedName::INIT, void),
    ));

    // Calling the constructor of an unloadable superclass can't be bound later
    let code = Code::new(
        1,
        1,
        vec![ALoad(0), Invoke(InvokeType::Special, base_init), Return],
    );
    let mut method = harness.method("<init>", "()V", MethodAccessFlags::PUBLIC, code);
    let analysis = harness.verify(&mut method).unwrap();
    match &method.code.instructions[1].op {
        Op::Deferred {
            kind: HardErrorKind::Linkage,
            message_id,
            ..
        } => assert_eq!(
            analysis.error_message(*message_id),
            Some("Base class no longer loadable")
        ),
        other => panic!("expected a deferred LinkageError, got {:?}", other),
    }

    // Constructing a fresh object of an unloadable class gets bound at runtime
    let code = Code::new(
        2,
        0,
        vec![
            New(base_class),
            Dup,
            Invoke(InvokeType::Special, base_init),
            Pop,
            Return,
        ],
    );
    let mut method = harness.method("make", "()V", STATIC, code);
    harness.verify(&mut method).unwrap();
    assert_eq!(method.code.instructions[0].op, Op::Resolved(New(base_class)));
    assert_eq!(
        method.code.instructions[2].op,
        Op::Resolved(DynamicInvoke(InvokeType::Special, base_init))
    );
}

#[test]
fn missing_receiver_class_names_the_referenced_class() {
    let arenas = ClassGraphArenas::new();
    let mut harness = Harness::new(&arenas);
    let animal = harness.add_class("zoo/Animal", harness.graph.java.object);
    let feed = harness.add_method_ref(
        animal,
        UnqualifiedName::from_string(String::from("feed")).unwrap(),
        "()V",
        MethodAccessFlags::PUBLIC,
    );

    // Only the receiver's class is missing
    let code = Code::new(
        1,
        1,
        vec![ALoad(0), Invoke(InvokeType::Virtual, feed), Return],
    );
    let mut method = harness.method("visit", "(Lgone/Pet;)V", STATIC, code);
    let analysis = harness.verify(&mut method).unwrap();
    match &method.code.instructions[1].op {
        Op::Deferred {
            kind: HardErrorKind::NoClassDefFound,
            message_id,
            ..
        } => assert_eq!(analysis.error_message(*message_id), Some("zoo.Animal")),
        other => panic!("expected a deferred NoClassDefFoundError, got {:?}", other),
    }
}
