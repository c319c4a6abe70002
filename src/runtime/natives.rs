use crate::memory::VmImage;

/// A host routine callable from bytecode.
///
/// The routine receives exclusive mutable access to the running image for
/// the duration of one call: it can peek, pop, and push stack words and
/// perform host-level I/O as a side effect. An `Err` becomes a
/// `NativeFailure` fault in the engine.
pub type NativeFn = Box<dyn FnMut(&mut VmImage) -> Result<(), String>>;

// =============================================================================
// NativeRegistry - the native call table
// =============================================================================

/// An ordered table of named host routines. Registration order fixes the
/// zero-based index that `CallNative` dispatches on; the table is built
/// before any program referencing it runs and name lookup is never needed
/// at execution time.
#[derive(Default)]
pub struct NativeRegistry {
    routines: Vec<(String, NativeFn)>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        NativeRegistry {
            routines: Vec::new(),
        }
    }

    /// Registers a routine under `name` and returns its table index.
    pub fn register(
        &mut self,
        name: &str,
        routine: impl FnMut(&mut VmImage) -> Result<(), String> + 'static,
    ) -> usize {
        self.routines.push((name.to_string(), Box::new(routine)));
        self.routines.len() - 1
    }

    /// Index a routine was registered at, by name. Assemble-time helper;
    /// the engine itself only ever resolves by index.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.routines.iter().position(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut NativeFn> {
        self.routines.get_mut(index).map(|(_, f)| f)
    }
}
