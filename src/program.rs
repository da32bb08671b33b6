//! The unit of compilation handed to the code generator.
//!
//! A [`Program`] bundles the type registry, the def table, the constant
//! table and the top-level body. Upstream phases produce it; here it is
//! only consumed (and, in tests, built by hand).

use crate::ast::{DefId, Node};
use crate::types::{Ty, TypeRegistry};

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

impl Param {
    pub fn new(name: &str, ty: Ty) -> Self {
        Param {
            name: name.to_string(),
            ty,
        }
    }
}

/// A method or free function, fully typed. Extern defs have no body and are
/// declared with external linkage under their bare name.
#[derive(Debug, Clone)]
pub struct Def {
    pub name: String,
    pub owner: Option<Ty>,
    pub params: Vec<Param>,
    pub return_type: Ty,
    pub body: Node,
    /// Whether calls to this def can unwind; under an active handler such
    /// calls use `invoke` instead of `call`.
    pub raises: bool,
    pub is_extern: bool,
}

impl Def {
    /// IR symbol for this def when specialized to `self_type`. Extern defs
    /// keep their bare C name; everything else gets an internal mangled name
    /// that is a pure function of the method identity and the receiver type.
    pub fn mangled_name(&self, types: &TypeRegistry, self_type: Option<Ty>, id: DefId) -> String {
        if self.is_extern {
            return self.name.clone();
        }
        match self_type.or(self.owner) {
            Some(owner) => format!("{}#{}@{}", types.name(owner), self.name, id),
            None => format!("{}@{}", self.name, id),
        }
    }
}

/// A program constant. Simple literal initializers become constant global
/// initializers; anything else runs once in the const chain before `main`.
#[derive(Debug, Clone)]
pub struct ConstDef {
    pub name: String,
    pub value: Node,
    pub ty: Ty,
}

#[derive(Debug)]
pub struct Program {
    pub types: TypeRegistry,
    pub defs: Vec<Def>,
    pub constants: Vec<ConstDef>,
    pub body: Node,
}

impl Program {
    pub fn new(types: TypeRegistry, body: Node) -> Self {
        Program {
            types,
            defs: Vec::new(),
            constants: Vec::new(),
            body,
        }
    }

    pub fn add_def(&mut self, def: Def) -> DefId {
        self.defs.push(def);
        self.defs.len() - 1
    }

    pub fn add_constant(&mut self, constant: ConstDef) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Looks up a def by bare name, used to prefer user-provided allocation
    /// functions (`__crystal_malloc`, `__crystal_realloc`) over libc.
    pub fn def_named(&self, name: &str) -> Option<DefId> {
        self.defs.iter().position(|d| d.name == name)
    }

    /// Every symbol literal in the program, sorted and deduplicated. The
    /// position in the returned list is the symbol's runtime id.
    pub fn collect_symbols(&self) -> Vec<String> {
        let mut set = std::collections::BTreeSet::new();
        let mut visit = |node: &Node| {
            if let Node::SymbolLit { value, .. } = node {
                set.insert(value.clone());
            }
        };
        self.body.walk(&mut visit);
        for def in &self.defs {
            def.body.walk(&mut visit);
        }
        for c in &self.constants {
            c.value.walk(&mut visit);
        }
        set.into_iter().collect()
    }
}
