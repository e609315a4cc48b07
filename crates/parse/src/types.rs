use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Size of `int`, pointers and code addresses on RV32.
pub const WORD_SIZE: usize = 4;

/// Largest object (and stack frame) whose size and offsets still fit a
/// signed 32-bit immediate.
pub const MAX_OBJECT_SIZE: usize = i32::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionType {
    pub ret: Type,
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Int,
    Char,
    Pointer(Box<Type>),
    Array(Box<Type>, usize),
    Function(Box<FunctionType>),
    Struct(Rc<StructLayout>),
    /// `struct tag` written before the tag's layout was registered
    /// (self-referential members, opaque pointers). Resolved by name through
    /// the [`TypeTable`] when a member access or a size needs it.
    Incomplete(String),
}

impl Type {
    pub fn pointer_to(ty: Type) -> Type {
        Type::Pointer(Box::new(ty))
    }

    pub fn array_of(ty: Type, n: usize) -> Type {
        Type::Array(Box::new(ty), n)
    }

    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Array(..))
    }

    /// Pointee of a pointer, element of an array.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) | Type::Array(inner, _) => Some(inner),
            _ => None,
        }
    }

    /// Arrays decay to a pointer to their element; everything else is unchanged.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array(elem, _) => Type::Pointer(elem.clone()),
            other => other.clone(),
        }
    }

    /// Byte size without consulting the struct registry.
    pub fn size(&self) -> Result<usize> {
        match self {
            Type::Void => bail!("invalid use of void type"),
            Type::Int => Ok(WORD_SIZE),
            Type::Char => Ok(1),
            Type::Pointer(_) | Type::Function(_) => Ok(WORD_SIZE),
            Type::Array(elem, n) => array_size(*n, elem.size()?),
            Type::Struct(layout) => Ok(layout.size()),
            Type::Incomplete(tag) => bail!("size of incomplete type 'struct {}'", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub members: Vec<Member>,
    size: usize,
}

impl StructLayout {
    /// Lay members out in declaration order. The running offset is rounded
    /// up to a multiple of 4 after every member. Member types naming an
    /// earlier struct only by tag are sized through `types`.
    pub fn new(name: &str, fields: Vec<(String, Type)>, types: &TypeTable) -> Result<Self> {
        let mut offset = 0usize;
        let mut size = 0usize;
        let mut members = Vec::with_capacity(fields.len());
        for (mname, ty) in fields {
            let msize = types
                .size_of(&ty)
                .map_err(|e| anyhow!("member '{}' of struct {}: {}", mname, name, e))?;
            size = offset
                .checked_add(msize)
                .filter(|&end| end <= MAX_OBJECT_SIZE)
                .ok_or_else(|| anyhow!("struct {} is too large", name))?;
            members.push(Member {
                name: mname,
                ty,
                offset,
            });
            offset = round_up(size, WORD_SIZE);
        }
        Ok(Self {
            name: name.to_string(),
            members,
            size,
        })
    }

    /// Offset of the last member plus its size.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn member_index(&self, name: &str) -> Result<usize> {
        self.members
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| anyhow!("failed to get member offset at '{}' in struct {}", name, self.name))
    }

    pub fn member(&self, name: &str) -> Result<&Member> {
        let i = self.member_index(name)?;
        Ok(&self.members[i])
    }
}

pub fn round_up(x: usize, align: usize) -> usize {
    x.div_ceil(align) * align
}

/// `n` elements of `elem` bytes, bounded by [`MAX_OBJECT_SIZE`].
pub fn array_size(n: usize, elem: usize) -> Result<usize> {
    n.checked_mul(elem)
        .filter(|&size| size <= MAX_OBJECT_SIZE)
        .ok_or_else(|| anyhow!("array of {} elements of {} bytes is too large", n, elem))
}

/// Struct layouts and typedef aliases. Both registries are append-only.
#[derive(Debug, Default)]
pub struct TypeTable {
    structs: HashMap<String, Rc<StructLayout>>,
    aliases: HashMap<String, Type>,
}

impl TypeTable {
    pub fn register_struct(&mut self, layout: StructLayout) -> Result<Rc<StructLayout>> {
        if self.structs.contains_key(&layout.name) {
            bail!("redefinition of struct {}", layout.name);
        }
        let layout = Rc::new(layout);
        self.structs.insert(layout.name.clone(), Rc::clone(&layout));
        Ok(layout)
    }

    pub fn lookup_struct(&self, name: &str) -> Option<Rc<StructLayout>> {
        self.structs.get(name).cloned()
    }

    pub fn register_alias(&mut self, name: &str, ty: Type) {
        self.aliases.insert(name.to_string(), ty);
    }

    pub fn lookup_alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name)
    }

    /// Layout of a struct type, resolving incomplete tags by name.
    pub fn struct_layout(&self, ty: &Type) -> Result<Rc<StructLayout>> {
        match ty {
            Type::Struct(layout) => Ok(Rc::clone(layout)),
            Type::Incomplete(tag) => self
                .lookup_struct(tag)
                .ok_or_else(|| anyhow!("struct {} is never defined", tag)),
            other => bail!("'{}' is not a struct type", other),
        }
    }

    /// Like [`Type::size`], but incomplete struct tags are looked up.
    pub fn size_of(&self, ty: &Type) -> Result<usize> {
        match ty {
            Type::Incomplete(_) => Ok(self.struct_layout(ty)?.size()),
            Type::Array(elem, n) => array_size(*n, self.size_of(elem)?),
            other => other.size(),
        }
    }
}

/// Render a declaration of `name` with type `ty` in C declarator syntax.
pub fn c_declarator(ty: &Type, name: &str) -> String {
    match ty {
        Type::Void => format!("void {}", name),
        Type::Int => format!("int {}", name),
        Type::Char => format!("char {}", name),
        Type::Struct(layout) => format!("struct {} {}", layout.name, name),
        Type::Incomplete(tag) => format!("struct {} {}", tag, name),
        Type::Pointer(inner) => c_declarator(inner, &format!("*{}", name)),
        Type::Array(elem, n) => c_declarator(elem, &format!("{}[{}]", name, n)),
        Type::Function(f) => {
            let params: Vec<String> = f.params.iter().map(|p| c_declarator(&p.ty, &p.name)).collect();
            c_declarator(&f.ret, &format!("{}({})", name, params.join(", ")))
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(c_declarator(self, "").trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(list: &[(&str, Type)]) -> Vec<(String, Type)> {
        list.iter().map(|(n, t)| (n.to_string(), t.clone())).collect()
    }

    #[test]
    fn char_member_is_padded_to_word() {
        let s = StructLayout::new("S", fields(&[("a", Type::Char), ("b", Type::Int)]), &TypeTable::default()).unwrap();
        assert_eq!(s.member("b").unwrap().offset, 4);
        assert_eq!(s.size(), 8);
    }

    #[test]
    fn trailing_char_is_not_padded() {
        let s = StructLayout::new("T", fields(&[("a", Type::Int), ("b", Type::Char)]), &TypeTable::default()).unwrap();
        assert_eq!(s.size(), 5);
    }

    #[test]
    fn offsets_strictly_increase() {
        let s = StructLayout::new(
            "U",
            fields(&[
                ("a", Type::Char),
                ("b", Type::array_of(Type::Char, 5)),
                ("c", Type::pointer_to(Type::Incomplete("U".into()))),
                ("d", Type::Int),
            ]),
            &TypeTable::default(),
        )
        .unwrap();
        let offs: Vec<usize> = s.members.iter().map(|m| m.offset).collect();
        assert_eq!(offs, vec![0, 4, 12, 16]);
        let last = s.members.last().unwrap();
        assert_eq!(s.size(), last.offset + last.ty.size().unwrap());
    }

    #[test]
    fn pointer_size_is_word_for_any_pointee() {
        let pointees = [
            Type::Int,
            Type::Char,
            Type::Void,
            Type::Incomplete("X".into()),
            Type::array_of(Type::Int, 100),
            Type::pointer_to(Type::Char),
        ];
        for t in pointees {
            assert_eq!(Type::pointer_to(t).size().unwrap(), 4);
        }
    }

    #[test]
    fn missing_member_is_an_error() {
        let s = StructLayout::new("S", fields(&[("a", Type::Int)]), &TypeTable::default()).unwrap();
        assert!(s.member_index("zz").is_err());
    }

    #[test]
    fn incomplete_struct_sized_through_table() {
        let mut table = TypeTable::default();
        table
            .register_struct(StructLayout::new("N", fields(&[("v", Type::Int), ("c", Type::Char)]), &TypeTable::default()).unwrap())
            .unwrap();
        let inc = Type::Incomplete("N".into());
        assert!(inc.size().is_err());
        assert_eq!(table.size_of(&inc).unwrap(), 5);
        assert_eq!(table.size_of(&Type::array_of(inc, 2)).unwrap(), 10);
    }

    #[test]
    fn member_named_by_forward_tag_is_sized_through_table() {
        let mut table = TypeTable::default();
        let inner = StructLayout::new("N", fields(&[("v", Type::Int), ("c", Type::Char)]), &table).unwrap();
        table.register_struct(inner).unwrap();
        let outer = StructLayout::new("M", fields(&[("n", Type::Incomplete("N".into())), ("k", Type::Int)]), &table).unwrap();
        assert_eq!(outer.member("k").unwrap().offset, 8);
        assert_eq!(outer.size(), 12);
    }

    #[test]
    fn oversized_arrays_are_rejected() {
        let table = TypeTable::default();
        let rows = Type::array_of(Type::Int, 1 << 20);
        assert!(table.size_of(&Type::array_of(rows.clone(), 1 << 20)).is_err());
        assert!(Type::array_of(Type::array_of(rows, usize::MAX / 2), 4).size().is_err());
        assert_eq!(table.size_of(&Type::array_of(Type::Char, MAX_OBJECT_SIZE)).unwrap(), MAX_OBJECT_SIZE);
    }

    #[test]
    fn struct_redefinition_rejected() {
        let mut table = TypeTable::default();
        table.register_struct(StructLayout::new("S", vec![], &TypeTable::default()).unwrap()).unwrap();
        assert!(table.register_struct(StructLayout::new("S", vec![], &TypeTable::default()).unwrap()).is_err());
    }

    #[test]
    fn declarator_rendering() {
        let t = Type::array_of(Type::pointer_to(Type::Char), 3);
        assert_eq!(c_declarator(&t, "argv"), "char *argv[3]");
        assert_eq!(Type::pointer_to(Type::Int).to_string(), "int *");
    }
}
