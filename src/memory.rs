use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::number::{Fixed, WORD};
use crate::runtime::fault::Fault;

/// Initial size of the growable program buffer, in bytes.
const BASE_PROGRAM_SIZE: usize = 512;

/// Sizing knobs for the non-program segments of an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemLayout {
    /// Capacity of the stack segment, in words.
    pub stack_words: usize,
}

impl Default for MemLayout {
    fn default() -> Self {
        MemLayout { stack_words: 256 }
    }
}

// =============================================================================
// VmMemory - the growable buffer the assembler emits into
// =============================================================================

/// Byte buffer in its assemble-time state: only the program region exists,
/// and it grows geometrically as instructions are appended.
#[derive(Debug)]
pub(crate) struct VmMemory {
    pub bytes: Vec<u8>,
    /// Emission cursor; doubles as the instruction pointer after finalize.
    pub ip: usize,
}

impl VmMemory {
    pub fn new() -> Self {
        VmMemory {
            bytes: vec![0; BASE_PROGRAM_SIZE],
            ip: 0,
        }
    }

    pub fn write_next_byte(&mut self, b: u8) {
        self.grow_if_needed(1);
        self.bytes[self.ip] = b;
        self.ip += 1;
    }

    pub fn write_next_word(&mut self, word: [u8; WORD]) {
        self.grow_if_needed(WORD);
        self.bytes[self.ip..self.ip + WORD].copy_from_slice(&word);
        self.ip += WORD;
    }

    /// Overwrites a previously emitted word in place (patching).
    pub fn patch_word(&mut self, pos: usize, word: [u8; WORD]) {
        self.bytes[pos..pos + WORD].copy_from_slice(&word);
    }

    fn grow_if_needed(&mut self, extra: usize) {
        let mut len = self.bytes.len();
        while self.ip + extra > len {
            len <<= 1;
        }
        if len != self.bytes.len() {
            self.bytes.resize(len, 0);
        }
    }
}

// =============================================================================
// VmImage - a finished, runnable memory image
// =============================================================================

/// A variable's binding: name to absolute data-segment slot offset.
///
/// Kept on the image for diagnostics only; execution always goes through
/// the offsets the assembler patched into the instruction stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub offset: usize,
}

/// A finalized memory image: one contiguous byte buffer holding the program,
/// stack, and data segments, plus the cursors into them.
///
/// Invariant: `stack_start <= sp <= stack_end` at all times; the word-level
/// accessors fault rather than read or write outside their segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmImage {
    bytes: Vec<u8>,
    pub(crate) ip: usize,
    sp: usize,
    program_end: usize,
    stack_start: usize,
    stack_end: usize,
    data_start: usize,
    variables: Vec<Variable>,
}

impl VmImage {
    pub(crate) fn new(
        bytes: Vec<u8>,
        program_end: usize,
        stack_start: usize,
        stack_end: usize,
        data_start: usize,
        variables: Vec<Variable>,
    ) -> Self {
        VmImage {
            bytes,
            ip: 0,
            sp: stack_start,
            program_end,
            stack_start,
            stack_end,
            data_start,
            variables,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    /// The program segment bytes.
    pub fn program(&self) -> &[u8] {
        &self.bytes[..self.program_end]
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Current value of a variable, looked up by name. Diagnostics only.
    pub fn variable(&self, name: &str) -> Option<Fixed> {
        let var = self.variables.iter().find(|v| v.name == name)?;
        self.read_slot(var.offset as i128).ok()
    }

    // -------------------------------------------------------------------------
    // Stack segment
    // -------------------------------------------------------------------------

    pub fn push(&mut self, value: Fixed) -> Result<(), Fault> {
        if self.sp + WORD > self.stack_end {
            return Err(Fault::StackOverflow);
        }
        self.bytes[self.sp..self.sp + WORD].copy_from_slice(&value.to_word());
        self.sp += WORD;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Fixed, Fault> {
        if self.sp < self.stack_start + WORD {
            return Err(Fault::StackUnderflow);
        }
        self.sp -= WORD;
        Ok(self.word_at(self.sp))
    }

    pub fn peek(&self) -> Result<Fixed, Fault> {
        if self.sp < self.stack_start + WORD {
            return Err(Fault::StackUnderflow);
        }
        Ok(self.word_at(self.sp - WORD))
    }

    /// Stack contents from bottom to top.
    pub fn stack_words(&self) -> Vec<Fixed> {
        (self.stack_start..self.sp)
            .step_by(WORD)
            .map(|pos| self.word_at(pos))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Program segment
    // -------------------------------------------------------------------------

    pub(crate) fn program_byte(&self, pos: usize) -> Option<u8> {
        if pos < self.program_end {
            Some(self.bytes[pos])
        } else {
            None
        }
    }

    /// Reads an immediate operand word from the instruction stream.
    pub(crate) fn operand_word(&self, pos: usize) -> Result<Fixed, Fault> {
        if pos + WORD > self.program_end {
            return Err(Fault::MissingHalt);
        }
        Ok(self.word_at(pos))
    }

    // -------------------------------------------------------------------------
    // Data segment
    // -------------------------------------------------------------------------

    pub fn read_slot(&self, offset: i128) -> Result<Fixed, Fault> {
        let off = self.check_slot(offset)?;
        Ok(self.word_at(off))
    }

    pub fn write_slot(&mut self, offset: i128, value: Fixed) -> Result<(), Fault> {
        let off = self.check_slot(offset)?;
        self.bytes[off..off + WORD].copy_from_slice(&value.to_word());
        Ok(())
    }

    fn check_slot(&self, offset: i128) -> Result<usize, Fault> {
        let bad = Fault::BadSlotOffset { offset };
        let off = usize::try_from(offset).map_err(|_| bad.clone())?;
        // The operand is attacker-controlled program data; the end-of-slot
        // sum itself can wrap near usize::MAX.
        let end = off.checked_add(WORD).ok_or_else(|| bad.clone())?;
        if off < self.data_start || end > self.bytes.len() || (off - self.data_start) % WORD != 0 {
            return Err(bad);
        }
        Ok(off)
    }

    /// Test-only corruption hook for exercising decoder faults.
    #[cfg(test)]
    pub(crate) fn poke_program_byte(&mut self, pos: usize, byte: u8) {
        self.bytes[pos] = byte;
    }

    fn word_at(&self, pos: usize) -> Fixed {
        let mut word = [0u8; WORD];
        word.copy_from_slice(&self.bytes[pos..pos + WORD]);
        Fixed::from_word(word)
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Serializes the whole image, cursors included, to an in-process byte
    /// snapshot. Not a stable interchange format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores an image from a [`VmImage::to_bytes`] snapshot.
    pub fn from_bytes(bytes: &[u8]) -> Result<VmImage, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    // -------------------------------------------------------------------------
    // Diagnostics
    // -------------------------------------------------------------------------

    /// Renders every variable, the stack word by word, and both cursors.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        for var in &self.variables {
            // An unreadable slot renders as a marker, never as an empty
            // value.
            let value = self
                .read_slot(var.offset as i128)
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "?".to_string());
            let _ = writeln!(out, "{}={}", var.name, value);
        }
        let stack = self.stack_words();
        let _ = writeln!(
            out,
            "stack[{}]: {}",
            stack.len(),
            stack
                .iter()
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let _ = writeln!(out, "ip={}; sp={}", self.ip, self.sp);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_image(stack_words: usize, variables: usize) -> VmImage {
        // One Halt byte of program, then an aligned stack and data segment.
        let program_end = 1;
        let stack_start = WORD;
        let stack_end = stack_start + stack_words * WORD;
        let data_start = stack_end;
        let vars = (0..variables)
            .map(|i| Variable {
                name: format!("v{}", i),
                offset: data_start + i * WORD,
            })
            .collect();
        VmImage::new(
            vec![0; data_start + variables * WORD],
            program_end,
            stack_start,
            stack_end,
            data_start,
            vars,
        )
    }

    #[test]
    fn test_push_pop() {
        let mut image = empty_image(4, 0);
        image.push(Fixed::from_int(1)).unwrap();
        image.push(Fixed::from_int(2)).unwrap();
        assert_eq!(image.pop(), Ok(Fixed::from_int(2)));
        assert_eq!(image.pop(), Ok(Fixed::from_int(1)));
    }

    #[test]
    fn test_stack_underflow() {
        let mut image = empty_image(4, 0);
        assert_eq!(image.pop(), Err(Fault::StackUnderflow));
        assert_eq!(image.peek(), Err(Fault::StackUnderflow));
    }

    #[test]
    fn test_stack_overflow_leaves_neighbors_untouched() {
        let mut image = empty_image(2, 1);
        image.write_slot(image.data_start as i128, Fixed::from_int(99)).unwrap();

        image.push(Fixed::from_int(1)).unwrap();
        image.push(Fixed::from_int(2)).unwrap();
        assert_eq!(image.push(Fixed::from_int(3)), Err(Fault::StackOverflow));

        // The data segment right after the stack still holds its value.
        assert_eq!(image.read_slot(image.data_start as i128), Ok(Fixed::from_int(99)));
        assert_eq!(image.stack_words(), vec![Fixed::from_int(1), Fixed::from_int(2)]);
    }

    #[test]
    fn test_slot_bounds() {
        let mut image = empty_image(2, 2);
        let first = image.data_start as i128;

        image.write_slot(first, Fixed::ONE).unwrap();
        assert_eq!(image.read_slot(first), Ok(Fixed::ONE));

        // Unaligned, negative, and out-of-range offsets all fault.
        assert!(matches!(
            image.read_slot(first + 1),
            Err(Fault::BadSlotOffset { .. })
        ));
        assert!(matches!(image.read_slot(-1), Err(Fault::BadSlotOffset { .. })));
        assert!(matches!(
            image.read_slot(first + 2 * WORD as i128),
            Err(Fault::BadSlotOffset { .. })
        ));
        // Stack segment offsets are not data slots.
        assert!(matches!(
            image.read_slot(image.stack_start as i128),
            Err(Fault::BadSlotOffset { .. })
        ));
        // Offsets whose end-of-slot position wraps around usize.
        assert!(matches!(
            image.read_slot((usize::MAX - 8) as i128),
            Err(Fault::BadSlotOffset { .. })
        ));
        assert!(matches!(
            image.write_slot(usize::MAX as i128, Fixed::ONE),
            Err(Fault::BadSlotOffset { .. })
        ));
    }

    #[test]
    fn test_variable_lookup_by_name() {
        let mut image = empty_image(2, 2);
        let offset = image.variables()[1].offset;
        image.write_slot(offset as i128, Fixed::from_int(7)).unwrap();
        assert_eq!(image.variable("v1"), Some(Fixed::from_int(7)));
        assert_eq!(image.variable("v0"), Some(Fixed::ZERO));
        assert_eq!(image.variable("missing"), None);
    }

    #[test]
    fn test_dump_state() {
        let mut image = empty_image(4, 1);
        image.push(Fixed::from_int(3)).unwrap();
        image.push("0.5".parse().unwrap()).unwrap();

        let dump = image.dump_state();
        assert!(dump.contains("v0=0"));
        assert!(dump.contains("stack[2]: 3 0.5"));
        assert!(dump.contains("sp="));
    }

    #[test]
    fn test_dump_state_marks_unreadable_slot() {
        // A variable whose offset points outside the data segment.
        let image = VmImage::new(
            vec![0; 2 * WORD],
            1,
            WORD,
            2 * WORD,
            2 * WORD,
            vec![Variable {
                name: "ghost".to_string(),
                offset: 3,
            }],
        );
        assert!(image.dump_state().contains("ghost=?"));
    }

    #[test]
    fn test_memory_grows_geometrically() {
        let mut mem = VmMemory::new();
        for _ in 0..BASE_PROGRAM_SIZE {
            mem.write_next_word([0xAB; WORD]);
        }
        assert!(mem.bytes.len() >= BASE_PROGRAM_SIZE * WORD);
        assert_eq!(mem.ip, BASE_PROGRAM_SIZE * WORD);
        assert!(mem.bytes[..mem.ip].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_postcard_round_trip() {
        let mut image = empty_image(4, 1);
        image.push(Fixed::from_int(42)).unwrap();
        image
            .write_slot(image.data_start as i128, "-1.5".parse().unwrap())
            .unwrap();

        let bytes = image.to_bytes().unwrap();
        let mut restored = VmImage::from_bytes(&bytes).unwrap();
        assert_eq!(restored.pop(), Ok(Fixed::from_int(42)));
        assert_eq!(restored.variable("v0"), Some("-1.5".parse().unwrap()));
    }
}
