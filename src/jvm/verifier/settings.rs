/// Knobs which change what verification accepts and how instructions get rewritten
#[derive(Clone, Debug)]
pub struct Settings {
    /// How references to classes which cannot be loaded are handled
    pub resolution: ResolutionMode,

    /// Track `float`/`double` arithmetic results as extended precision values
    ///
    /// When set, storing such a value into a local or an array of a non-`strictfp` method gets
    /// rewritten into a narrowing store.
    pub extended_precision: bool,

    /// Debug information will be emitted for the method
    ///
    /// Stores whose value is never read still get a local variable, and local variables are
    /// matched up using the `LocalVariableTable` (names and ranges) instead of just slot and
    /// type.
    pub emit_debug_info: bool,

    /// Only allow writes to final fields from the declaring class' `<init>` (for instance fields)
    /// or `<clinit>` (for static fields)
    pub strict_final_field_semantics: bool,

    /// Remove `assert` statements, by turning `getstatic $assertionsDisabled; ifne` into a
    /// jump over the assertion
    pub remove_assertions: bool,

    /// Make verification fail on the first error which would otherwise only be raised when the
    /// instruction runs
    pub fail_on_deferred_errors: bool,
}

/// When are references to unloadable classes resolved?
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ResolutionMode {
    /// All classes are known now. Instructions mentioning unloadable ones will throw
    /// `NoClassDefFoundError` if they ever run.
    AheadOfTime,

    /// Classes may show up later. Member accesses on unloadable classes get bound at runtime.
    Dynamic,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            resolution: ResolutionMode::AheadOfTime,
            extended_precision: true,
            emit_debug_info: false,
            strict_final_field_semantics: false,
            remove_assertions: false,
            fail_on_deferred_errors: false,
        }
    }

    pub fn is_ahead_of_time(&self) -> bool {
        self.resolution == ResolutionMode::AheadOfTime
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::new()
    }
}
