//! The Beryl type model and the semantic queries the code generator consumes.
//!
//! Types are arena-allocated in a [`TypeRegistry`] and referred to by the
//! copyable handle [`Ty`]. The handle's index doubles as the stable
//! `type_id` used for runtime discrimination in tagged unions, hierarchy
//! values, and exception rescue matching, so interning order is part of the
//! emitted program's ABI.
//!
//! The registry answers two families of questions:
//! - classification predicates (`is_union`, `is_nilable`, `is_hierarchy`,
//!   `passed_by_value`, ...) that drive representation choices, and
//! - structural queries (`concrete_types`, `subtypes`, `index_of_instance_var`,
//!   `llvm_size`, ...) that drive layout and dispatch.
//!
//! No inference happens here. Upstream phases (or tests) build programs by
//! interning types through the `add_*` constructors.

use std::collections::HashMap;

/// Handle to an interned type. The wrapped index is the type's `type_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ty(pub u32);

impl Ty {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Integer kinds carried by number literals and primitive defs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl NumberKind {
    pub fn is_float(self) -> bool {
        matches!(self, NumberKind::F32 | NumberKind::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            NumberKind::I8 | NumberKind::I16 | NumberKind::I32 | NumberKind::I64
        )
    }

    pub fn bits(self) -> u32 {
        match self {
            NumberKind::I8 | NumberKind::U8 => 8,
            NumberKind::I16 | NumberKind::U16 => 16,
            NumberKind::I32 | NumberKind::U32 | NumberKind::F32 => 32,
            NumberKind::I64 | NumberKind::U64 | NumberKind::F64 => 64,
        }
    }
}

/// The closed set of type shapes known to the generator.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Nil,
    Bool,
    Char,
    Symbol,
    Void,
    NoReturn,
    Int { bits: u32, signed: bool },
    Float { bits: u32 },
    /// A user class or struct. `by_value` classes (declared `struct`) are
    /// stack values; everything else is a heap reference.
    Class {
        name: String,
        superclass: Option<Ty>,
        ivars: Vec<(String, Ty)>,
        by_value: bool,
    },
    CStruct {
        name: String,
        fields: Vec<(String, Ty)>,
    },
    CUnion {
        name: String,
        fields: Vec<(String, Ty)>,
    },
    Pointer { elem: Ty },
    /// A sum of alternatives. The nilable special case (`T | Nil` over a
    /// reference class) is classified by predicate, not by a separate kind.
    Union { members: Vec<Ty> },
    /// The open polymorphic supertype of `base` and all its subclasses.
    Hierarchy { base: Ty },
}

/// Arena of interned types; the oracle the code generator queries.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<TypeKind>,
    hierarchies: HashMap<Ty, Ty>,
    // Well-known handles, interned by `new` in a fixed order.
    nil: Ty,
    bool_: Ty,
    char_: Ty,
    symbol: Ty,
    void: Ty,
    no_return: Ty,
    numbers: HashMap<NumberKind, Ty>,
    string: Ty,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut reg = TypeRegistry {
            types: Vec::new(),
            hierarchies: HashMap::new(),
            nil: Ty(0),
            bool_: Ty(0),
            char_: Ty(0),
            symbol: Ty(0),
            void: Ty(0),
            no_return: Ty(0),
            numbers: HashMap::new(),
            string: Ty(0),
        };
        reg.nil = reg.intern(TypeKind::Nil);
        reg.bool_ = reg.intern(TypeKind::Bool);
        reg.char_ = reg.intern(TypeKind::Char);
        reg.symbol = reg.intern(TypeKind::Symbol);
        reg.void = reg.intern(TypeKind::Void);
        reg.no_return = reg.intern(TypeKind::NoReturn);
        for kind in [
            NumberKind::I8,
            NumberKind::I16,
            NumberKind::I32,
            NumberKind::I64,
            NumberKind::U8,
            NumberKind::U16,
            NumberKind::U32,
            NumberKind::U64,
        ] {
            let ty = reg.intern(TypeKind::Int {
                bits: kind.bits(),
                signed: kind.is_signed(),
            });
            reg.numbers.insert(kind, ty);
        }
        for kind in [NumberKind::F32, NumberKind::F64] {
            let ty = reg.intern(TypeKind::Float { bits: kind.bits() });
            reg.numbers.insert(kind, ty);
        }
        reg.string = reg.add_class("String", None, false);
        reg
    }

    fn intern(&mut self, kind: TypeKind) -> Ty {
        let id = Ty(self.types.len() as u32);
        self.types.push(kind);
        id
    }

    pub fn kind(&self, ty: Ty) -> &TypeKind {
        &self.types[ty.index()]
    }

    // --- Construction ---

    pub fn add_class(&mut self, name: &str, superclass: Option<Ty>, by_value: bool) -> Ty {
        self.intern(TypeKind::Class {
            name: name.to_string(),
            superclass,
            ivars: Vec::new(),
            by_value,
        })
    }

    pub fn add_ivar(&mut self, class: Ty, name: &str, ty: Ty) {
        match &mut self.types[class.index()] {
            TypeKind::Class { ivars, .. } => ivars.push((name.to_string(), ty)),
            _ => panic!("add_ivar on non-class type"),
        }
    }

    pub fn add_c_struct(&mut self, name: &str, fields: Vec<(String, Ty)>) -> Ty {
        self.intern(TypeKind::CStruct {
            name: name.to_string(),
            fields,
        })
    }

    pub fn add_c_union(&mut self, name: &str, fields: Vec<(String, Ty)>) -> Ty {
        self.intern(TypeKind::CUnion {
            name: name.to_string(),
            fields,
        })
    }

    pub fn pointer_of(&mut self, elem: Ty) -> Ty {
        for (i, kind) in self.types.iter().enumerate() {
            if matches!(kind, TypeKind::Pointer { elem: e } if *e == elem) {
                return Ty(i as u32);
            }
        }
        self.intern(TypeKind::Pointer { elem })
    }

    /// Interns the union of `members`. Order is preserved and significant:
    /// the member list is part of the program handed to us by inference,
    /// which has already normalized it.
    pub fn union_of(&mut self, members: &[Ty]) -> Ty {
        for (i, kind) in self.types.iter().enumerate() {
            if matches!(kind, TypeKind::Union { members: m } if m.as_slice() == members) {
                return Ty(i as u32);
            }
        }
        self.intern(TypeKind::Union {
            members: members.to_vec(),
        })
    }

    /// The nilable form of a reference class: `class | Nil`.
    pub fn nilable_of(&mut self, class: Ty) -> Ty {
        let nil = self.nil;
        self.union_of(&[class, nil])
    }

    /// Interns (once per base) the hierarchy type over `base`.
    pub fn hierarchy_of(&mut self, base: Ty) -> Ty {
        if let Some(&h) = self.hierarchies.get(&base) {
            return h;
        }
        let h = self.intern(TypeKind::Hierarchy { base });
        self.hierarchies.insert(base, h);
        h
    }

    // --- Well-known handles ---

    pub fn nil(&self) -> Ty {
        self.nil
    }
    pub fn bool_(&self) -> Ty {
        self.bool_
    }
    pub fn char_(&self) -> Ty {
        self.char_
    }
    pub fn symbol(&self) -> Ty {
        self.symbol
    }
    pub fn void(&self) -> Ty {
        self.void
    }
    pub fn no_return(&self) -> Ty {
        self.no_return
    }
    pub fn string(&self) -> Ty {
        self.string
    }

    pub fn number(&self, kind: NumberKind) -> Ty {
        self.numbers[&kind]
    }

    pub fn int32(&self) -> Ty {
        self.number(NumberKind::I32)
    }

    pub fn int64(&self) -> Ty {
        self.number(NumberKind::I64)
    }

    pub fn float64(&self) -> Ty {
        self.number(NumberKind::F64)
    }

    // --- Classification predicates ---

    pub fn is_nil(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Nil)
    }

    pub fn is_bool(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Bool)
    }

    pub fn is_void(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Void | TypeKind::Nil)
    }

    pub fn is_no_return(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::NoReturn)
    }

    pub fn is_class(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Class { .. })
    }

    pub fn is_c_struct(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::CStruct { .. })
    }

    pub fn is_c_union(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::CUnion { .. })
    }

    pub fn is_pointer(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Pointer { .. })
    }

    pub fn is_hierarchy(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Hierarchy { .. })
    }

    pub fn is_integer(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Int { .. })
    }

    pub fn is_float(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Float { .. })
    }

    /// True when `ty` is `T | Nil` over a reference class: represented as a
    /// nullable pointer rather than a tagged union.
    pub fn is_nilable(&self, ty: Ty) -> bool {
        self.nilable_member(ty).is_some()
    }

    /// True when `ty` uses the tagged-union representation. The nilable case
    /// is excluded: it collapses to a nullable pointer.
    pub fn is_union(&self, ty: Ty) -> bool {
        matches!(self.kind(ty), TypeKind::Union { .. }) && !self.is_nilable(ty)
    }

    /// True for types whose values are stack structs rather than heap
    /// references: C structs/unions and `struct`-declared classes.
    pub fn passed_by_value(&self, ty: Ty) -> bool {
        match self.kind(ty) {
            TypeKind::CStruct { .. } | TypeKind::CUnion { .. } => true,
            TypeKind::Class { by_value, .. } => *by_value,
            _ => false,
        }
    }

    /// Whether defs owned by `ty` receive a `self` parameter.
    pub fn passed_as_self(&self, ty: Ty) -> bool {
        !matches!(
            self.kind(ty),
            TypeKind::Nil | TypeKind::Void | TypeKind::NoReturn
        )
    }

    // --- Structural queries ---

    pub fn type_id(&self, ty: Ty) -> u32 {
        ty.0
    }

    pub fn name(&self, ty: Ty) -> String {
        match self.kind(ty) {
            TypeKind::Nil => "Nil".into(),
            TypeKind::Bool => "Bool".into(),
            TypeKind::Char => "Char".into(),
            TypeKind::Symbol => "Symbol".into(),
            TypeKind::Void => "Void".into(),
            TypeKind::NoReturn => "NoReturn".into(),
            TypeKind::Int { bits, signed } => {
                format!("{}Int{}", if *signed { "" } else { "U" }, bits)
            }
            TypeKind::Float { bits } => format!("Float{}", bits),
            TypeKind::Class { name, .. }
            | TypeKind::CStruct { name, .. }
            | TypeKind::CUnion { name, .. } => name.clone(),
            TypeKind::Pointer { elem } => format!("Pointer({})", self.name(*elem)),
            TypeKind::Union { members } => {
                let names: Vec<String> = members.iter().map(|m| self.name(*m)).collect();
                names.join("|")
            }
            TypeKind::Hierarchy { base } => format!("{}+", self.name(*base)),
        }
    }

    /// Members of a union type, in declared order.
    pub fn union_members(&self, ty: Ty) -> &[Ty] {
        match self.kind(ty) {
            TypeKind::Union { members } => members,
            _ => panic!("union_members on non-union type"),
        }
    }

    /// The non-nil member of a nilable type, if `ty` is nilable.
    pub fn nilable_member(&self, ty: Ty) -> Option<Ty> {
        let members = match self.kind(ty) {
            TypeKind::Union { members } => members,
            _ => return None,
        };
        if members.len() != 2 {
            return None;
        }
        let (a, b) = (members[0], members[1]);
        let pick = |m: Ty, other: Ty| -> Option<Ty> {
            if self.is_nil(other) && self.is_class(m) && !self.passed_by_value(m) {
                Some(m)
            } else {
                None
            }
        };
        pick(a, b).or_else(|| pick(b, a))
    }

    /// Base class of a hierarchy type.
    pub fn hierarchy_base(&self, ty: Ty) -> Ty {
        match self.kind(ty) {
            TypeKind::Hierarchy { base } => *base,
            _ => panic!("hierarchy_base on non-hierarchy type"),
        }
    }

    /// All classes deriving from `base`, including `base` itself.
    pub fn subtypes(&self, base: Ty) -> Vec<Ty> {
        let mut out = Vec::new();
        for i in 0..self.types.len() {
            let candidate = Ty(i as u32);
            if self.is_class(candidate) && self.derives_from(candidate, base) {
                out.push(candidate);
            }
        }
        out
    }

    fn derives_from(&self, ty: Ty, base: Ty) -> bool {
        let mut cur = Some(ty);
        while let Some(c) = cur {
            if c == base {
                return true;
            }
            cur = match self.kind(c) {
                TypeKind::Class { superclass, .. } => *superclass,
                _ => None,
            };
        }
        false
    }

    /// The concrete alternatives a value of `ty` can hold at runtime.
    pub fn concrete_types(&self, ty: Ty) -> Vec<Ty> {
        match self.kind(ty) {
            TypeKind::Union { members } => {
                let mut out = Vec::new();
                for &m in members {
                    out.extend(self.concrete_types(m));
                }
                out
            }
            TypeKind::Hierarchy { base } => self.subtypes(*base),
            _ => vec![ty],
        }
    }

    /// Subtype/membership test used by `is_a` folding and receiver matching.
    pub fn implements(&self, ty: Ty, other: Ty) -> bool {
        if ty == other {
            return true;
        }
        match self.kind(other) {
            TypeKind::Union { members } => members.iter().any(|&m| self.implements(ty, m)),
            TypeKind::Hierarchy { base } => self.derives_from(ty, *base),
            TypeKind::Class { .. } => self.derives_from(ty, other),
            _ => false,
        }
    }

    /// Instance variables of a class, inherited first.
    pub fn all_ivars(&self, class: Ty) -> Vec<(String, Ty)> {
        match self.kind(class) {
            TypeKind::Class {
                superclass, ivars, ..
            } => {
                let mut out = match superclass {
                    Some(sup) => self.all_ivars(*sup),
                    None => Vec::new(),
                };
                out.extend(ivars.iter().cloned());
                out
            }
            TypeKind::CStruct { fields, .. } | TypeKind::CUnion { fields, .. } => fields.clone(),
            _ => panic!("all_ivars on non-aggregate type"),
        }
    }

    /// Field index of `name` within the instance struct of `class`.
    pub fn index_of_instance_var(&self, class: Ty, name: &str) -> Option<usize> {
        self.all_ivars(class).iter().position(|(n, _)| n == name)
    }

    /// Declared type of instance variable `name`.
    pub fn lookup_instance_var(&self, class: Ty, name: &str) -> Option<Ty> {
        self.all_ivars(class)
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    // --- Sizes ---

    /// ABI size in bytes of the value representation of `ty`. For unions
    /// this includes the i32 tag and the padded payload; for aggregates it
    /// follows natural alignment (align = min(size, 8)).
    pub fn llvm_size(&self, ty: Ty) -> u64 {
        match self.kind(ty) {
            TypeKind::Nil | TypeKind::Bool | TypeKind::Char => 1,
            TypeKind::Void | TypeKind::NoReturn => 0,
            TypeKind::Symbol => 4,
            TypeKind::Int { bits, .. } | TypeKind::Float { bits } => (*bits as u64) / 8,
            TypeKind::Pointer { .. } => 8,
            TypeKind::Class { by_value, .. } => {
                if *by_value {
                    self.aggregate_size(ty)
                } else {
                    8
                }
            }
            TypeKind::CStruct { .. } => self.aggregate_size(ty),
            TypeKind::CUnion { fields, .. } => {
                let max = fields
                    .iter()
                    .map(|(_, t)| self.llvm_size(*t))
                    .max()
                    .unwrap_or(1);
                round_up(max, align_of_size(max))
            }
            TypeKind::Union { .. } => {
                if self.is_nilable(ty) {
                    8
                } else {
                    round_up(4 + self.union_payload_size(ty), 8)
                }
            }
            TypeKind::Hierarchy { .. } => 16,
        }
    }

    /// Size in bytes of a tagged union's payload slot: the size of its
    /// largest alternative, at least pointer-sized.
    pub fn union_payload_size(&self, ty: Ty) -> u64 {
        let mut max = 8;
        for member in self.concrete_types(ty) {
            max = max.max(self.llvm_size(member));
        }
        max
    }

    /// Heap size of a class instance (the struct behind the reference).
    pub fn instance_size(&self, class: Ty) -> u64 {
        self.aggregate_size(class)
    }

    fn aggregate_size(&self, ty: Ty) -> u64 {
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for (_, field_ty) in self.all_ivars(ty) {
            let size = self.llvm_size(field_ty).max(1);
            let align = align_of_size(size);
            max_align = max_align.max(align);
            offset = round_up(offset, align) + size;
        }
        round_up(offset.max(1), max_align)
    }
}

fn align_of_size(size: u64) -> u64 {
    match size {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nilable_classification() {
        let mut reg = TypeRegistry::new();
        let foo = reg.add_class("Foo", None, false);
        let nilable = reg.nilable_of(foo);
        assert!(reg.is_nilable(nilable));
        assert!(!reg.is_union(nilable));
        assert_eq!(reg.nilable_member(nilable), Some(foo));

        let i32_ty = reg.int32();
        let mixed = reg.union_of(&[i32_ty, foo]);
        assert!(reg.is_union(mixed));
        assert!(!reg.is_nilable(mixed));
    }

    #[test]
    fn hierarchy_subtypes_include_base() {
        let mut reg = TypeRegistry::new();
        let base = reg.add_class("Shape", None, false);
        let circle = reg.add_class("Circle", Some(base), false);
        let square = reg.add_class("Square", Some(base), false);
        let hier = reg.hierarchy_of(base);
        let subs = reg.subtypes(base);
        assert_eq!(subs, vec![base, circle, square]);
        assert!(reg.implements(circle, hier));
        assert!(reg.implements(circle, base));
        assert!(!reg.implements(base, circle));
    }

    #[test]
    fn union_payload_covers_largest_member() {
        let mut reg = TypeRegistry::new();
        let i64_ty = reg.int64();
        let b = reg.bool_();
        let u = reg.union_of(&[b, i64_ty]);
        assert_eq!(reg.union_payload_size(u), 8);
        assert_eq!(reg.llvm_size(u), 16);
    }

    #[test]
    fn ivar_layout_is_inherited_first() {
        let mut reg = TypeRegistry::new();
        let a = reg.add_class("A", None, false);
        reg.add_ivar(a, "x", reg.int32());
        let b = reg.add_class("B", Some(a), false);
        reg.add_ivar(b, "y", reg.int64());
        assert_eq!(reg.index_of_instance_var(b, "x"), Some(0));
        assert_eq!(reg.index_of_instance_var(b, "y"), Some(1));
        assert_eq!(reg.lookup_instance_var(b, "y"), Some(reg.int64()));
        assert_eq!(reg.instance_size(b), 16);
    }
}
