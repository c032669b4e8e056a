use fxhash::FxBuildHasher;
use indexmap::IndexMap;

pub(crate) type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// First address handed out to variables.
pub const VARIABLE_BASE: u16 = 16;

/// Symbols known to every program, in the order they are listed by the symbol dump.
pub const PREDEFINED: [(&str, u16); 23] = [
    ("SP", 0),
    ("LCL", 1),
    ("ARG", 2),
    ("THIS", 3),
    ("THAT", 4),
    ("R0", 0),
    ("R1", 1),
    ("R2", 2),
    ("R3", 3),
    ("R4", 4),
    ("R5", 5),
    ("R6", 6),
    ("R7", 7),
    ("R8", 8),
    ("R9", 9),
    ("R10", 10),
    ("R11", 11),
    ("R12", 12),
    ("R13", 13),
    ("R14", 14),
    ("R15", 15),
    ("SCREEN", 0x4000),
    ("KBD", 0x6000),
];

/// How a name came to be bound.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Binding {
    Predefined,
    /// Instruction address of a `(LABEL)` declaration
    Label,
    /// RAM cell allocated on first use
    Variable,
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Predefined => write!(f, "predefined symbol"),
            Binding::Label => write!(f, "label"),
            Binding::Variable => write!(f, "variable"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Entry {
    pub addr: u16,
    pub binding: Binding,
}

/// Symbol table of name -> address for one assembly run.
///
/// Labels are bound to instruction addresses and never move the variable cursor. Variables are
/// handed consecutive RAM cells starting at [`VARIABLE_BASE`], in order of first use.
#[derive(Debug)]
pub struct SymbolTable {
    table: FxMap<String, Entry>,
    next_var: u16,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = FxMap::with_capacity_and_hasher(PREDEFINED.len(), FxBuildHasher::default());
        for (name, addr) in PREDEFINED {
            table.insert(
                name.to_string(),
                Entry {
                    addr,
                    binding: Binding::Predefined,
                },
            );
        }
        SymbolTable {
            table,
            next_var: VARIABLE_BASE,
        }
    }

    /// Address of `name`, allocating the next variable cell if it is not bound yet.
    pub fn bind_if_absent(&mut self, name: &str) -> u16 {
        if let Some(entry) = self.table.get(name) {
            return entry.addr;
        }
        let addr = self.next_var;
        self.table.insert(
            name.to_string(),
            Entry {
                addr,
                binding: Binding::Variable,
            },
        );
        // Overflow past 15 bits is reported when the address is encoded
        self.next_var = self.next_var.saturating_add(1);
        addr
    }

    /// Bind a label to an instruction address. Returns the existing entry if `name` is taken.
    pub fn bind_label(&mut self, name: &str, addr: u16) -> Result<(), Entry> {
        if let Some(entry) = self.table.get(name) {
            return Err(*entry);
        }
        self.table.insert(
            name.to_string(),
            Entry {
                addr,
                binding: Binding::Label,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<u16> {
        self.table.get(name).map(|entry| entry.addr)
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.table.get(name)
    }

    /// Address the next new variable will receive.
    pub fn next_variable(&self) -> u16 {
        self.next_var
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Bindings in insertion order: predefined, then labels, then variables by first use.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.table.iter().map(|(name, entry)| (name.as_str(), entry))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
