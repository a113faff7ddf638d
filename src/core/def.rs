//! Top-level definitions.
//!
//! Definitions live in a [`Definitions`] registry and are referred to by
//! typed ids. A definition is added once its header (parameters and result
//! type) has been checked; its body and final [`Status`] are filled in
//! afterwards, which lets recursive bodies mention their own id.

use fxhash::FxHashMap;

use crate::core::elim::{Body, Pattern};
use crate::core::sort::Sort;
use crate::core::{Binding, ExprPtr};
use crate::symbol::Symbol;

macro_rules! def_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);
    };
}

def_id!(FunId);
def_id!(DataId);
def_id!(ConId);
def_id!(ClassId);
def_id!(FieldId);

/// How far a definition has made it through type-checking.
///
/// Calls may be built as soon as the header is checked, but the evaluator
/// only unfolds bodies of definitions that checked without errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Status {
    HeaderChecked,
    NoErrors,
    HasErrors,
}

impl Status {
    pub fn headers_ok(&self) -> bool {
        !matches!(self, Status::HasErrors)
    }

    pub fn body_ok(&self) -> bool {
        matches!(self, Status::NoErrors)
    }
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Symbol,
    pub params: Vec<Binding>,
    pub result_type: ExprPtr,
    pub body: Option<Body>,
    pub status: Status,
}

#[derive(Debug)]
pub struct DataDef {
    pub name: Symbol,
    pub params: Vec<Binding>,
    pub sort: Sort,
    pub constructors: Vec<ConId>,
    /// Positions at which the data type is covariant in its parameters;
    /// comparison weakens only at these positions.
    pub covariant: Vec<bool>,
    /// Set when some constructor restricts the data type's parameters with
    /// patterns. Eliminating such a data type requires computing the set of
    /// constructors matching the concrete parameters.
    pub has_indexed_constructors: bool,
    pub status: Status,
}

impl DataDef {
    pub fn is_covariant(&self, index: usize) -> bool {
        self.covariant.get(index).copied().unwrap_or(false)
    }
}

#[derive(Debug)]
pub struct ConstructorDef {
    pub name: Symbol,
    pub data: DataId,
    /// Parameters of the data type as seen from this constructor. When
    /// `patterns` is present these are the pattern variables instead.
    pub data_params: Vec<Binding>,
    pub params: Vec<Binding>,
    /// Restrictions on the data type parameters for indexed families.
    pub patterns: Option<Vec<Pattern>>,
    /// Conditions: computation rules identifying constructor applications,
    /// used by higher inductive types.
    pub body: Option<Body>,
    pub status: Status,
}

/// A field implementation stored in a class definition. The term may refer
/// to the instance it is projected from through `this_binding`.
#[derive(Debug, Clone)]
pub struct ClassImpl {
    pub this_binding: Binding,
    pub term: ExprPtr,
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: Symbol,
    pub fields: Vec<FieldId>,
    pub superclasses: Vec<ClassId>,
    pub implemented: FxHashMap<FieldId, ClassImpl>,
    pub sort: Sort,
    pub status: Status,
}

impl ClassDef {
    pub fn is_implemented(&self, field: FieldId) -> bool {
        self.implemented.contains_key(&field)
    }
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: Symbol,
    pub class: ClassId,
    /// The instance the field is projected from; `ty` may depend on it.
    pub this_binding: Binding,
    pub ty: ExprPtr,
    pub status: Status,
}

/// The registry of checked definitions. Ids index into per-kind arenas.
#[derive(Debug, Default)]
pub struct Definitions {
    functions: Vec<FunctionDef>,
    datas: Vec<DataDef>,
    constructors: Vec<ConstructorDef>,
    classes: Vec<ClassDef>,
    fields: Vec<FieldDef>,
}

impl Definitions {
    pub fn new() -> Definitions {
        Definitions::default()
    }

    pub fn add_function(&mut self, def: FunctionDef) -> FunId {
        self.functions.push(def);
        FunId(self.functions.len() as u32 - 1)
    }

    pub fn add_data(&mut self, def: DataDef) -> DataId {
        self.datas.push(def);
        DataId(self.datas.len() as u32 - 1)
    }

    /// Register a constructor and append it to its data type.
    pub fn add_constructor(&mut self, def: ConstructorDef) -> ConId {
        let data = def.data;
        let indexed = def.patterns.is_some();
        self.constructors.push(def);
        let id = ConId(self.constructors.len() as u32 - 1);
        let data = &mut self.datas[data.0 as usize];
        data.constructors.push(id);
        data.has_indexed_constructors |= indexed;
        id
    }

    pub fn add_class(&mut self, def: ClassDef) -> ClassId {
        self.classes.push(def);
        ClassId(self.classes.len() as u32 - 1)
    }

    /// Register a field and append it to its class.
    pub fn add_field(&mut self, def: FieldDef) -> FieldId {
        let class = def.class;
        self.fields.push(def);
        let id = FieldId(self.fields.len() as u32 - 1);
        self.classes[class.0 as usize].fields.push(id);
        id
    }

    pub fn function(&self, id: FunId) -> &FunctionDef {
        &self.functions[id.0 as usize]
    }

    pub fn data(&self, id: DataId) -> &DataDef {
        &self.datas[id.0 as usize]
    }

    pub fn constructor(&self, id: ConId) -> &ConstructorDef {
        &self.constructors[id.0 as usize]
    }

    pub fn class(&self, id: ClassId) -> &ClassDef {
        &self.classes[id.0 as usize]
    }

    pub fn field(&self, id: FieldId) -> &FieldDef {
        &self.fields[id.0 as usize]
    }

    pub fn set_function_body(&mut self, id: FunId, body: Option<Body>, status: Status) {
        let def = &mut self.functions[id.0 as usize];
        def.body = body;
        def.status = status;
    }

    pub fn set_function_status(&mut self, id: FunId, status: Status) {
        self.functions[id.0 as usize].status = status;
    }

    pub fn set_data_status(&mut self, id: DataId, status: Status) {
        self.datas[id.0 as usize].status = status;
    }

    pub fn set_constructor_body(&mut self, id: ConId, body: Option<Body>, status: Status) {
        let def = &mut self.constructors[id.0 as usize];
        def.body = body;
        def.status = status;
    }

    /// The reflexive, transitive subclass relation.
    pub fn is_subclass_of(&self, class: ClassId, superclass: ClassId) -> bool {
        class == superclass
            || self
                .class(class)
                .superclasses
                .iter()
                .any(|parent| self.is_subclass_of(*parent, superclass))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Expr;

    fn stub_class(name: &str, superclasses: Vec<ClassId>) -> ClassDef {
        ClassDef {
            name: Symbol::intern(name),
            fields: Vec::new(),
            superclasses,
            implemented: FxHashMap::default(),
            sort: Sort::STD,
            status: Status::NoErrors,
        }
    }

    #[test]
    fn subclass_relation_is_reflexive_and_transitive() {
        let mut defs = Definitions::new();
        let base = defs.add_class(stub_class("Base", vec![]));
        let mid = defs.add_class(stub_class("Mid", vec![base]));
        let leaf = defs.add_class(stub_class("Leaf", vec![mid]));
        assert!(defs.is_subclass_of(leaf, leaf));
        assert!(defs.is_subclass_of(leaf, base));
        assert!(!defs.is_subclass_of(base, leaf));
    }

    #[test]
    fn constructor_registration_updates_data() {
        let mut defs = Definitions::new();
        let nat = defs.add_data(DataDef {
            name: Symbol::intern("Nat"),
            params: Vec::new(),
            sort: Sort::SET0,
            constructors: Vec::new(),
            covariant: Vec::new(),
            has_indexed_constructors: false,
            status: Status::NoErrors,
        });
        let zero = defs.add_constructor(ConstructorDef {
            name: Symbol::intern("zero"),
            data: nat,
            data_params: Vec::new(),
            params: Vec::new(),
            patterns: None,
            body: None,
            status: Status::NoErrors,
        });
        assert_eq!(defs.data(nat).constructors, vec![zero]);
        assert!(!defs.data(nat).has_indexed_constructors);
        let _ = Expr::con_call(&defs, zero, Sort::SET0, vec![], vec![]);
    }
}
