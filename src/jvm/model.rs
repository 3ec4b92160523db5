use super::{ConstantPool, Code, MethodAccessFlags, MethodDescriptor, UnqualifiedName};

/// The parts of a class that matter when verifying one of its methods
#[derive(Debug)]
pub struct ClassInfo<C> {
    /// Class being verified
    pub this_class: C,

    /// Major version of the class file
    pub major_version: u16,

    pub constants: ConstantPool<C>,
}

/// Method to verify
#[derive(Debug)]
pub struct MethodInfo<C> {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<C>,
    pub access_flags: MethodAccessFlags,
    pub code: Code,
}

impl<C> MethodInfo<C> {
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_strict(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STRICT)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}
