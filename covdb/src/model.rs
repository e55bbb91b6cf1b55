//! Static structure of instrumented source files.
//!
//! Every element owning coverage slots stores an index *relative* to the `data_index` of its file. A method owns one
//! slot (its entry), a statement one slot, and a branch two consecutive slots (the true edge, then the false edge).

use error::*;
use format::tagged::*;

use fixedbitset::{FixedBitSet, Ones};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

#[cfg(feature = "serde")]
use std::result::Result as StdResult;

//----------------------------------------------------------------------------------------------------------------------
//{{{ Attributes

macro_rules! derive_serde_for_attr {
    ($flags:path, $kind:expr) => {
        #[cfg(feature="serde")]
        impl Serialize for $flags {
            fn serialize<S: Serializer>(&self, serializer: S) -> StdResult<S::Ok, S::Error> {
                serializer.serialize_u8(self.bits())
            }
        }

        impl $flags {
            /// Decodes stored flags, rejecting unknown bits.
            pub fn from_stored(bits: u8) -> Result<$flags> {
                <$flags>::from_bits(bits).ok_or_else(|| ErrorKind::InvalidField($kind, i64::from(bits)).into())
            }
        }
    }
}

bitflags! {
    /// Kind of a class.
    #[derive(Default)]
    pub struct ClassAttr: u8 {
        const CLASS_ATTR_ANNOTATION = 1;
        const CLASS_ATTR_ENUM = 2;
        const CLASS_ATTR_INTERFACE = 4;
        /// The class contains tests.
        const CLASS_ATTR_TEST = 8;
    }
}

derive_serde_for_attr! {
    ClassAttr, "class attributes"
}

bitflags! {
    /// Kind of a method.
    #[derive(Default)]
    pub struct MethodAttr: u8 {
        const METHOD_ATTR_TEST = 1;
        const METHOD_ATTR_LAMBDA = 2;
    }
}

derive_serde_for_attr! {
    MethodAttr, "method attributes"
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ SourceRegion & ContextSet

/// A span of source code. Lines and columns are 1-based.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SourceRegion {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SourceRegion {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> SourceRegion {
        SourceRegion {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl Tagged for SourceRegion {
    const TAG: Tag = SOURCE_REGION_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_u32(self.start_line)?;
        out.write_u32(self.start_column)?;
        out.write_u32(self.end_line)?;
        out.write_u32(self.end_column)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(SourceRegion {
            start_line: input.read_u32()?,
            start_column: input.read_u32()?,
            end_line: input.read_u32()?,
            end_column: input.read_u32()?,
        })
    }
}

/// The set of contexts (`if`, `catch`, custom regexp contexts, ...) enclosing an element, as indices into the
/// [`ContextStore`].
///
/// [`ContextStore`]: ./struct.ContextStore.html
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ContextSet(#[cfg_attr(feature = "serde", serde(serialize_with = "::utils::serialize_bitset"))] FixedBitSet);

impl ContextSet {
    pub fn new() -> ContextSet {
        ContextSet::default()
    }

    /// Adds a context index.
    pub fn with(mut self, index: usize) -> ContextSet {
        if index >= self.0.len() {
            self.0.grow(index + 1);
        }
        self.0.insert(index);
        self
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.contains(index)
    }

    pub fn indices(&self) -> Ones {
        self.0.ones()
    }
}

impl Tagged for ContextSet {
    const TAG: Tag = CONTEXT_SET_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_bitset(&self.0)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        input.read_bitset().map(ContextSet)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ StatementInfo & BranchInfo

/// A statement.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatementInfo {
    pub context: ContextSet,
    pub relative_index: u32,
    pub complexity: u32,
    /// Identifier of the language construct, e.g. `"stmt"`.
    pub construct: String,
    pub region: SourceRegion,
}

impl Tagged for StatementInfo {
    const TAG: Tag = STATEMENT_INFO_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write(&self.context)?;
        out.write_u32(self.relative_index)?;
        out.write_u32(self.complexity)?;
        out.write_str(&self.construct)?;
        out.write(&self.region)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(StatementInfo {
            context: input.read()?,
            relative_index: input.read_u32()?,
            complexity: input.read_u32()?,
            construct: input.read_str()?,
            region: input.read()?,
        })
    }
}

/// A two-way branch. The true edge is at `relative_index`, the false edge right after it.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BranchInfo {
    pub context: ContextSet,
    pub relative_index: u32,
    pub complexity: u32,
    pub construct: String,
    /// Whether the condition was rewritten to record both edges. Uninstrumented branches still own their slots.
    pub instrumented: bool,
    pub region: SourceRegion,
}

impl BranchInfo {
    /// Relative indices of the true and false slots.
    pub fn relative_slots(&self) -> (u32, u32) {
        (self.relative_index, self.relative_index + 1)
    }
}

impl Tagged for BranchInfo {
    const TAG: Tag = BRANCH_INFO_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write(&self.context)?;
        out.write_u32(self.relative_index)?;
        out.write_u32(self.complexity)?;
        out.write_str(&self.construct)?;
        out.write_bool(self.instrumented)?;
        out.write(&self.region)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(BranchInfo {
            context: input.read()?,
            relative_index: input.read_u32()?,
            complexity: input.read_u32()?,
            construct: input.read_str()?,
            instrumented: input.read_bool()?,
            region: input.read()?,
        })
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ MethodInfo

/// Name and types of a method.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MethodSignature {
    pub name: String,
    pub return_type: Option<String>,
    pub parameter_types: Vec<String>,
}

impl MethodSignature {
    fn write_to(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_opt_str(self.return_type.as_ref().map(|s| &**s))?;
        out.write_len("parameter count", self.parameter_types.len())?;
        for ty in &self.parameter_types {
            out.write_str(ty)?;
        }
        Ok(())
    }

    fn read_from(input: &mut BodyReader) -> Result<MethodSignature> {
        let name = input.read_str()?;
        let return_type = input.read_opt_str()?;
        let count = input.read_u32()?;
        let mut parameter_types = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            parameter_types.push(input.read_str()?);
        }
        Ok(MethodSignature {
            name,
            return_type,
            parameter_types,
        })
    }
}

/// A method, function or lambda.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MethodInfo {
    pub signature: MethodSignature,
    /// Test name assigned at instrumentation time, e.g. from an annotation.
    pub static_test_name: Option<String>,
    pub attrs: MethodAttr,
    pub context: ContextSet,
    /// Slot recording entries into the method.
    pub relative_index: u32,
    /// Number of slots owned by the method including its body.
    pub data_length: u32,
    pub complexity: u32,
    pub aggregated_complexity: u32,
    pub aggregated_statements: u32,
    pub construct: String,
    pub region: SourceRegion,
    pub statements: Vec<StatementInfo>,
    pub branches: Vec<BranchInfo>,
    pub inner_classes: Vec<ClassInfo>,
    pub inner_methods: Vec<MethodInfo>,
}

impl MethodInfo {
    pub fn is_test(&self) -> bool {
        self.attrs.contains(MethodAttr::METHOD_ATTR_TEST)
    }

    pub fn is_lambda(&self) -> bool {
        self.attrs.contains(MethodAttr::METHOD_ATTR_LAMBDA)
    }
}

impl Tagged for MethodInfo {
    const TAG: Tag = METHOD_INFO_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        self.signature.write_to(out)?;
        out.write_opt_str(self.static_test_name.as_ref().map(|s| &**s))?;
        out.write_u8(self.attrs.bits())?;
        out.write(&self.context)?;
        out.write_u32(self.relative_index)?;
        out.write_u32(self.data_length)?;
        out.write_u32(self.complexity)?;
        out.write_u32(self.aggregated_complexity)?;
        out.write_u32(self.aggregated_statements)?;
        out.write_str(&self.construct)?;
        out.write(&self.region)?;
        out.write_list(&self.statements)?;
        out.write_list(&self.branches)?;
        out.write_list(&self.inner_classes)?;
        out.write_list(&self.inner_methods)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(MethodInfo {
            signature: MethodSignature::read_from(input)?,
            static_test_name: input.read_opt_str()?,
            attrs: MethodAttr::from_stored(input.read_u8()?)?,
            context: input.read()?,
            relative_index: input.read_u32()?,
            data_length: input.read_u32()?,
            complexity: input.read_u32()?,
            aggregated_complexity: input.read_u32()?,
            aggregated_statements: input.read_u32()?,
            construct: input.read_str()?,
            region: input.read()?,
            statements: input.read_list()?,
            branches: input.read_list()?,
            inner_classes: input.read_list()?,
            inner_methods: input.read_list()?,
        })
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ ClassInfo

/// A class, interface, enum or annotation type.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ClassInfo {
    pub name: String,
    pub qualified_name: String,
    pub relative_index: u32,
    pub data_length: u32,
    pub aggregated_complexity: u32,
    pub aggregated_statements: u32,
    pub attrs: ClassAttr,
    pub region: SourceRegion,
    pub classes: Vec<ClassInfo>,
    pub methods: Vec<MethodInfo>,
    pub statements: Vec<StatementInfo>,
    /// Language modifier bits (`public`, `final`, ...). Absent from older registries, where it reads as 0.
    pub modifiers: u32,
}

impl ClassInfo {
    pub fn is_test(&self) -> bool {
        self.attrs.contains(ClassAttr::CLASS_ATTR_TEST)
    }
}

impl Tagged for ClassInfo {
    const TAG: Tag = CLASS_INFO_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_str(&self.qualified_name)?;
        out.write_u32(self.relative_index)?;
        out.write_u32(self.data_length)?;
        out.write_u32(self.aggregated_complexity)?;
        out.write_u32(self.aggregated_statements)?;
        out.write_u8(self.attrs.bits())?;
        out.write(&self.region)?;
        out.write_list(&self.classes)?;
        out.write_list(&self.methods)?;
        out.write_list(&self.statements)?;
        out.write_u32(self.modifiers)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        let mut class = ClassInfo {
            name: input.read_str()?,
            qualified_name: input.read_str()?,
            relative_index: input.read_u32()?,
            data_length: input.read_u32()?,
            aggregated_complexity: input.read_u32()?,
            aggregated_statements: input.read_u32()?,
            attrs: ClassAttr::from_stored(input.read_u8()?)?,
            region: input.read()?,
            classes: input.read_list()?,
            methods: input.read_list()?,
            statements: input.read_list()?,
            modifiers: 0,
        };
        if input.has_remaining() {
            class.modifiers = input.read_u32()?;
        }
        Ok(class)
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ FileInfo

/// A coverage-bearing element of a file, as enumerated by [`FileInfo::visit()`].
///
/// [`FileInfo::visit()`]: ./struct.FileInfo.html#method.visit
#[derive(Copy, Clone, Debug)]
pub enum Element<'a> {
    Method(&'a MethodInfo),
    Statement(&'a StatementInfo),
    Branch(&'a BranchInfo),
}

/// The instrumented structure of one source file.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct FileInfo {
    /// Path of the file, relative to its source root.
    pub name: String,
    pub package_name: String,
    pub encoding: String,
    /// Modification time of the source in epoch milliseconds.
    pub timestamp: i64,
    pub file_size: u64,
    pub checksum: u64,
    /// First slot owned by the file.
    pub data_index: u32,
    /// Number of slots owned by the file.
    pub data_length: u32,
    pub min_version: u64,
    pub max_version: u64,
    pub line_count: u32,
    pub nc_line_count: u32,
    pub classes: Vec<ClassInfo>,
    /// Top-level functions.
    pub methods: Vec<MethodInfo>,
    /// Top-level statements.
    pub statements: Vec<StatementInfo>,
}

impl FileInfo {
    pub fn new(name: &str, package_name: &str, data_index: u32, data_length: u32) -> FileInfo {
        FileInfo {
            name: name.to_owned(),
            package_name: package_name.to_owned(),
            encoding: "UTF-8".to_owned(),
            data_index,
            data_length,
            ..FileInfo::default()
        }
    }

    /// Converts a relative index into an absolute slot.
    pub fn slot_of(&self, relative_index: u32) -> usize {
        self.data_index as usize + relative_index as usize
    }

    /// One past the last slot owned by this file.
    pub fn slot_end(&self) -> usize {
        self.data_index as usize + self.data_length as usize
    }

    /// Calls `f` on every method, statement and branch, depth first.
    pub fn visit<F: FnMut(Element)>(&self, f: &mut F) {
        for class in &self.classes {
            visit_class(class, f);
        }
        for method in &self.methods {
            visit_method(method, f);
        }
        for statement in &self.statements {
            f(Element::Statement(statement));
        }
    }
}

fn visit_class<F: FnMut(Element)>(class: &ClassInfo, f: &mut F) {
    for inner in &class.classes {
        visit_class(inner, f);
    }
    for method in &class.methods {
        visit_method(method, f);
    }
    for statement in &class.statements {
        f(Element::Statement(statement));
    }
}

fn visit_method<F: FnMut(Element)>(method: &MethodInfo, f: &mut F) {
    f(Element::Method(method));
    for statement in &method.statements {
        f(Element::Statement(statement));
    }
    for branch in &method.branches {
        f(Element::Branch(branch));
    }
    for class in &method.inner_classes {
        visit_class(class, f);
    }
    for inner in &method.inner_methods {
        visit_method(inner, f);
    }
}

impl Tagged for FileInfo {
    const TAG: Tag = FILE_INFO_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_str(&self.package_name)?;
        out.write_str(&self.encoding)?;
        out.write_i64(self.timestamp)?;
        out.write_u64(self.file_size)?;
        out.write_u64(self.checksum)?;
        out.write_u32(self.data_index)?;
        out.write_u32(self.data_length)?;
        out.write_u64(self.min_version)?;
        out.write_u64(self.max_version)?;
        out.write_u32(self.line_count)?;
        out.write_u32(self.nc_line_count)?;
        out.write_list(&self.classes)?;
        out.write_list(&self.methods)?;
        out.write_list(&self.statements)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(FileInfo {
            name: input.read_str()?,
            package_name: input.read_str()?,
            encoding: input.read_str()?,
            timestamp: input.read_i64()?,
            file_size: input.read_u64()?,
            checksum: input.read_u64()?,
            data_index: input.read_u32()?,
            data_length: input.read_u32()?,
            min_version: input.read_u64()?,
            max_version: input.read_u64()?,
            line_count: input.read_u32()?,
            nc_line_count: input.read_u32()?,
            classes: input.read_list()?,
            methods: input.read_list()?,
            statements: input.read_list()?,
        })
    }
}

//}}}
//----------------------------------------------------------------------------------------------------------------------
//{{{ ContextStore

/// Names of the built-in contexts. The position in this list is the context index.
pub const BUILTIN_CONTEXTS: [&str; 19] = [
    "CLOVER:OFF",
    "static",
    "instance",
    "constructor",
    "method",
    "switch",
    "while",
    "do",
    "for",
    "if",
    "else",
    "try",
    "catch",
    "finally",
    "sync",
    "assert",
    "@deprecated",
    "private",
    "property",
];

/// A custom context matching method signatures.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MethodRegexpContext {
    pub name: String,
    pub index: u32,
    pub pattern: String,
    pub max_complexity: u32,
    pub max_statements: u32,
    pub max_aggregated_complexity: u32,
    pub max_aggregated_statements: u32,
}

impl Tagged for MethodRegexpContext {
    const TAG: Tag = METHOD_CONTEXT_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_u32(self.index)?;
        out.write_str(&self.pattern)?;
        out.write_u32(self.max_complexity)?;
        out.write_u32(self.max_statements)?;
        out.write_u32(self.max_aggregated_complexity)?;
        out.write_u32(self.max_aggregated_statements)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(MethodRegexpContext {
            name: input.read_str()?,
            index: input.read_u32()?,
            pattern: input.read_str()?,
            max_complexity: input.read_u32()?,
            max_statements: input.read_u32()?,
            max_aggregated_complexity: input.read_u32()?,
            max_aggregated_statements: input.read_u32()?,
        })
    }
}

/// A custom context matching statement text.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatementRegexpContext {
    pub name: String,
    pub index: u32,
    pub pattern: String,
}

impl Tagged for StatementRegexpContext {
    const TAG: Tag = STATEMENT_CONTEXT_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_str(&self.name)?;
        out.write_u32(self.index)?;
        out.write_str(&self.pattern)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(StatementRegexpContext {
            name: input.read_str()?,
            index: input.read_u32()?,
            pattern: input.read_str()?,
        })
    }
}

/// The contexts known to an instrumentation session.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ContextStore {
    /// Index assigned to the next custom context.
    pub next_index: u32,
    pub method_contexts: Vec<MethodRegexpContext>,
    pub statement_contexts: Vec<StatementRegexpContext>,
}

impl Default for ContextStore {
    fn default() -> ContextStore {
        ContextStore {
            next_index: BUILTIN_CONTEXTS.len() as u32,
            method_contexts: Vec::new(),
            statement_contexts: Vec::new(),
        }
    }
}

impl ContextStore {
    pub fn new() -> ContextStore {
        ContextStore::default()
    }

    /// Finds the index of a built-in or custom context by name.
    pub fn index_of(&self, name: &str) -> Option<u32> {
        if let Some(i) = BUILTIN_CONTEXTS.iter().position(|n| *n == name) {
            return Some(i as u32);
        }
        let methods = self.method_contexts.iter().map(|c| (&*c.name, c.index));
        let statements = self.statement_contexts.iter().map(|c| (&*c.name, c.index));
        methods.chain(statements).find(|&(n, _)| n == name).map(|(_, i)| i)
    }

    fn check_new_name(&self, name: &str) -> Result<()> {
        if BUILTIN_CONTEXTS.contains(&name) {
            bail!("the name \"{}\" is already in use by one of the builtin contexts", name);
        }
        if self.index_of(name).is_some() {
            bail!("the context \"{}\" is already defined", name);
        }
        Ok(())
    }

    /// Registers a method context, assigning it the next free index.
    pub fn add_method_context(&mut self, mut context: MethodRegexpContext) -> Result<u32> {
        self.check_new_name(&context.name)?;
        context.index = self.next_index;
        self.next_index += 1;
        self.method_contexts.push(context);
        Ok(self.next_index - 1)
    }

    /// Registers a statement context, assigning it the next free index.
    pub fn add_statement_context(&mut self, mut context: StatementRegexpContext) -> Result<u32> {
        self.check_new_name(&context.name)?;
        context.index = self.next_index;
        self.next_index += 1;
        self.statement_contexts.push(context);
        Ok(self.next_index - 1)
    }
}

impl Tagged for ContextStore {
    const TAG: Tag = CONTEXT_STORE_TAG;

    fn write_body(&self, out: &mut BodyWriter) -> Result<()> {
        out.write_u32(self.next_index)?;
        out.write_list(&self.method_contexts)?;
        out.write_list(&self.statement_contexts)
    }

    fn read_body(input: &mut BodyReader) -> Result<Self> {
        Ok(ContextStore {
            next_index: input.read_u32()?,
            method_contexts: input.read_list()?,
            statement_contexts: input.read_list()?,
        })
    }
}

//}}}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A file with one class holding one method of 4 slots: entry, one statement and one branch.
    pub fn sample_file_info(name: &str, data_index: u32) -> FileInfo {
        let method = MethodInfo {
            signature: MethodSignature {
                name: "run".to_owned(),
                return_type: Some("void".to_owned()),
                parameter_types: vec!["int".to_owned(), "String[]".to_owned()],
            },
            static_test_name: Some("runs".to_owned()),
            attrs: MethodAttr::METHOD_ATTR_TEST,
            context: ContextSet::new().with(4),
            relative_index: 0,
            data_length: 4,
            complexity: 2,
            construct: "method".to_owned(),
            region: SourceRegion::new(3, 5, 9, 6),
            statements: vec![StatementInfo {
                context: ContextSet::new().with(4),
                relative_index: 1,
                complexity: 0,
                construct: "stmt".to_owned(),
                region: SourceRegion::new(4, 9, 4, 20),
            }],
            branches: vec![BranchInfo {
                context: ContextSet::new().with(4).with(9),
                relative_index: 2,
                complexity: 1,
                construct: "if".to_owned(),
                instrumented: true,
                region: SourceRegion::new(5, 9, 5, 30),
            }],
            ..MethodInfo::default()
        };
        FileInfo {
            classes: vec![ClassInfo {
                name: "Main".to_owned(),
                qualified_name: "app.Main".to_owned(),
                data_length: 4,
                attrs: ClassAttr::CLASS_ATTR_TEST,
                region: SourceRegion::new(1, 1, 10, 2),
                methods: vec![method],
                modifiers: 1,
                ..ClassInfo::default()
            }],
            line_count: 10,
            nc_line_count: 8,
            ..FileInfo::new(name, "app", data_index, 4)
        }
    }

    #[test]
    fn test_file_info_round_trip() {
        (|| -> Result<()> {
            let info = sample_file_info("app/Main.java", 10);
            let mut buf = Vec::new();
            write_segment(&mut buf, &REGISTRY_TAGS, &info)?;
            let decoded: FileInfo = read_segment(&buf[..], 0, &REGISTRY_TAGS, "file info")?;
            assert_eq!(decoded, info);
            assert!(decoded.classes[0].is_test());
            assert!(decoded.classes[0].methods[0].is_test());
            assert!(!decoded.classes[0].methods[0].is_lambda());
            Ok(())
        })().unwrap();
    }

    #[test]
    fn test_visit_and_slots() {
        let info = sample_file_info("app/Main.java", 10);
        let mut slots = Vec::new();
        info.visit(&mut |element| match element {
            Element::Method(m) => slots.push(("method", info.slot_of(m.relative_index))),
            Element::Statement(s) => slots.push(("statement", info.slot_of(s.relative_index))),
            Element::Branch(b) => {
                let (t, f) = b.relative_slots();
                slots.push(("true", info.slot_of(t)));
                slots.push(("false", info.slot_of(f)));
            },
        });
        assert_eq!(slots, vec![("method", 10), ("statement", 11), ("true", 12), ("false", 13)]);
        assert_eq!(info.slot_end(), 14);
    }

    #[test]
    fn test_unknown_attr_bits() {
        assert!(ClassAttr::from_stored(0x80).is_err());
        assert_eq!(MethodAttr::from_stored(3).unwrap(), MethodAttr::METHOD_ATTR_TEST | MethodAttr::METHOD_ATTR_LAMBDA);
    }

    #[test]
    fn test_context_store() {
        (|| -> Result<()> {
            let mut store = ContextStore::new();
            assert_eq!(store.index_of("catch"), Some(12));
            assert_eq!(store.next_index, 19);

            let index = store.add_method_context(MethodRegexpContext {
                name: "getters".to_owned(),
                pattern: "public .* get.*\\(\\)".to_owned(),
                max_complexity: 1,
                max_statements: 1,
                max_aggregated_complexity: 1,
                max_aggregated_statements: 1,
                ..MethodRegexpContext::default()
            })?;
            assert_eq!(index, 19);
            let index = store.add_statement_context(StatementRegexpContext {
                name: "logging".to_owned(),
                pattern: "LOG\\..*".to_owned(),
                ..StatementRegexpContext::default()
            })?;
            assert_eq!(index, 20);
            assert_eq!(store.index_of("logging"), Some(20));

            assert!(store.add_statement_context(StatementRegexpContext { name: "if".to_owned(), ..StatementRegexpContext::default() }).is_err());
            assert!(store.add_statement_context(StatementRegexpContext { name: "getters".to_owned(), ..StatementRegexpContext::default() }).is_err());
            assert_eq!(store.next_index, 21);

            let mut buf = Vec::new();
            write_segment(&mut buf, &REGISTRY_TAGS, &store)?;
            let decoded: ContextStore = read_segment(&buf[..], 0, &REGISTRY_TAGS, "context store")?;
            assert_eq!(decoded, store);
            Ok(())
        })().unwrap();
    }
}
