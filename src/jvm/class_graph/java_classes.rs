use super::{ClassData, ClassId};
use crate::jvm::{BinaryName, ClassAccessFlags};
use elsa::FrozenVec;

/// Standard library classes present in every class graph
///
/// These are the classes the verifier itself refers to (see [`crate::jvm::CoreClass`]) plus a
/// few common ones which are handy when describing other classes.
pub struct JavaClasses<'g> {
    pub object: ClassId<'g>,
    pub cloneable: ClassId<'g>,
    pub serializable: ClassId<'g>,
    pub comparable: ClassId<'g>,
    pub char_sequence: ClassId<'g>,
    pub string: ClassId<'g>,
    pub class: ClassId<'g>,
    pub number: ClassId<'g>,
    pub integer: ClassId<'g>,
    pub throwable: ClassId<'g>,
    pub error: ClassId<'g>,
    pub exception: ClassId<'g>,
    pub runtime_exception: ClassId<'g>,
}

impl<'g> JavaClasses<'g> {
    /// Create the classes, handing each one to `add` to be registered
    pub(super) fn allocate(mut add: impl FnMut(ClassData<'g>) -> ClassId<'g>) -> JavaClasses<'g> {
        let public = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
        let public_final = public | ClassAccessFlags::FINAL;
        let public_abstract = public | ClassAccessFlags::ABSTRACT;
        let public_interface =
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;

        let object = add(ClassData {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: vec![],
            access_flags: public,
            unloadable: false,
            methods: FrozenVec::new(),
            fields: FrozenVec::new(),
        });

        let cloneable = add(ClassData::new(
            BinaryName::CLONEABLE,
            object,
            public_interface,
            vec![],
        ));
        let serializable = add(ClassData::new(
            BinaryName::SERIALIZABLE,
            object,
            public_interface,
            vec![],
        ));
        let comparable = add(ClassData::new(
            BinaryName::COMPARABLE,
            object,
            public_interface,
            vec![],
        ));
        let char_sequence = add(ClassData::new(
            BinaryName::CHARSEQUENCE,
            object,
            public_interface,
            vec![],
        ));
        let string = add(ClassData::new(
            BinaryName::STRING,
            object,
            public_final,
            vec![serializable, comparable, char_sequence],
        ));
        let class = add(ClassData::new(
            BinaryName::CLASS,
            object,
            public_final,
            vec![serializable],
        ));
        let number = add(ClassData::new(
            BinaryName::NUMBER,
            object,
            public_abstract,
            vec![serializable],
        ));
        let integer = add(ClassData::new(
            BinaryName::INTEGER,
            number,
            public_final,
            vec![comparable],
        ));
        let throwable = add(ClassData::new(
            BinaryName::THROWABLE,
            object,
            public,
            vec![serializable],
        ));
        let error = add(ClassData::new(
            BinaryName::ERROR,
            throwable,
            public,
            vec![],
        ));
        let exception = add(ClassData::new(
            BinaryName::EXCEPTION,
            throwable,
            public,
            vec![],
        ));
        let runtime_exception = add(ClassData::new(
            BinaryName::RUNTIMEEXCEPTION,
            exception,
            public,
            vec![],
        ));

        JavaClasses {
            object,
            cloneable,
            serializable,
            comparable,
            char_sequence,
            string,
            class,
            number,
            integer,
            throwable,
            error,
            exception,
            runtime_exception,
        }
    }
}
