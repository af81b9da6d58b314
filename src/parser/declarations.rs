// Declaration table: collects declarations from every file of a unit,
// assigns USRs and resolves references in the main file.

use std::collections::HashMap;
use std::rc::Rc;
use tree_sitter::Node;

use super::{CursorKind, SourceFile};

/// (file index, node id)
pub(crate) type NodeKey = (usize, usize);

const ANONYMOUS: &str = "(anonymous)";

#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub name: String,
    pub kind: CursorKind,
    pub usr: String,
    /// Scope the name is visible in
    pub scope: Vec<String>,
    /// Enclosing named path used for the USR
    pub path: Vec<String>,
    pub file: usize,
    pub start_byte: usize,
    pub end_byte: usize,
    pub is_definition: bool,
    /// Target of a using-declaration: qualifiers followed by the name
    alias_of: Option<Vec<String>>,
}

#[derive(Debug, Default)]
pub(crate) struct DeclarationTable {
    decls: Vec<Declaration>,
    by_name: HashMap<String, Vec<usize>>,
    declared: HashMap<NodeKey, usize>,
    references: HashMap<NodeKey, usize>,
    definitions: HashMap<String, usize>,
}

impl DeclarationTable {
    pub fn build(files: &[SourceFile]) -> Self {
        let mut table = Self::default();

        for (index, file) in files.iter().enumerate() {
            let mut walker = Walker::new(&mut table, index, file, Mode::Collect);
            walker.walk(file.tree.root_node());
        }

        table.finalize(files);

        if let Some(main) = files.first() {
            let mut walker = Walker::new(&mut table, 0, main, Mode::Resolve);
            walker.walk(main.tree.root_node());
        }

        table
    }

    pub fn declared_at(&self, key: NodeKey) -> Option<&Declaration> {
        self.declared.get(&key).map(|&id| &self.decls[id])
    }

    pub fn referenced_at(&self, key: NodeKey) -> Option<&Declaration> {
        self.references.get(&key).map(|&id| &self.decls[id])
    }

    pub fn definition_of(&self, usr: &str) -> Option<&Declaration> {
        self.definitions.get(usr).map(|&id| &self.decls[id])
    }

    fn finalize(&mut self, files: &[SourceFile]) {
        let mut scopes: HashMap<Vec<String>, CursorKind> = HashMap::new();
        for decl in &self.decls {
            if decl.kind == CursorKind::Namespace || decl.kind.is_record() || decl.kind == CursorKind::Enum {
                let mut path = decl.path.clone();
                path.push(decl.name.clone());
                scopes.entry(path).or_insert(decl.kind);
            }
        }

        for decl in &mut self.decls {
            if decl.kind == CursorKind::Function && scopes.get(&decl.path).is_some_and(|kind| kind.is_record()) {
                decl.kind = CursorKind::Method;
            }

            let file_name = files[decl.file]
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            decl.usr = usr_for(decl, &scopes, &file_name);
        }

        for (id, decl) in self.decls.iter().enumerate() {
            self.by_name.entry(decl.name.clone()).or_default().push(id);
            if decl.is_definition {
                self.definitions.entry(decl.usr.clone()).or_insert(id);
            }
        }
    }

    fn candidates<'s>(&'s self, name: &str) -> impl Iterator<Item = (usize, &'s Declaration)> + 's {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(move |&id| (id, &self.decls[id]))
    }

    /// Unqualified lookup from `chain`, innermost visible scope wins
    fn lookup(&self, name: &str, chain: &[String], leaf_kind: &str) -> Option<usize> {
        if let Some((id, _)) = self.candidates(name).find(|(_, d)| d.kind == CursorKind::MacroDefinition) {
            return Some(id);
        }

        let mut best: Option<(usize, usize)> = None;
        for (id, decl) in self.candidates(name) {
            if !accepts(leaf_kind, decl.kind) || !is_visible_from(&decl.scope, chain) {
                continue;
            }
            let depth = visible(&decl.scope).count();
            if best.map_or(true, |(d, _)| depth > d) {
                best = Some((depth, id));
            }
        }

        best.map(|(_, id)| self.follow_alias(id))
    }

    /// Lookup of `qualifiers::name`, trying the qualifiers relative to each
    /// enclosing scope from the innermost outwards
    fn lookup_qualified(&self, qualifiers: &[String], name: &str, chain: &[String], leaf_kind: &str) -> Option<usize> {
        for depth in (0..=chain.len()).rev() {
            let path: Vec<&str> = visible(&chain[..depth])
                .chain(qualifiers.iter().map(String::as_str))
                .collect();

            let found = self.candidates(name).find(|(_, decl)| {
                accepts(leaf_kind, decl.kind)
                    && (visible(&decl.scope).eq(path.iter().copied()) || visible(&decl.path).eq(path.iter().copied()))
            });
            if let Some((id, _)) = found {
                return Some(self.follow_alias(id));
            }
        }

        // Qualifiers relative to a namespace pulled in by a using-directive
        self.candidates(name)
            .find(|(_, decl)| {
                accepts(leaf_kind, decl.kind) && {
                    let scope: Vec<&str> = visible(&decl.path).collect();
                    scope.ends_with(&qualifiers.iter().map(String::as_str).collect::<Vec<_>>())
                }
            })
            .map(|(id, _)| self.follow_alias(id))
    }

    /// Member access through `.` or `->`: resolved when the enclosing class
    /// scope owns the name, or when every candidate shares one USR
    fn lookup_member(&self, name: &str, chain: &[String]) -> Option<usize> {
        let members: Vec<(usize, &Declaration)> = self
            .candidates(name)
            .filter(|(_, d)| matches!(d.kind, CursorKind::Field | CursorKind::Method))
            .collect();

        let (first_id, first) = *members.first()?;

        let enclosing = members
            .iter()
            .filter(|(_, d)| is_visible_from(&d.scope, chain))
            .max_by_key(|(_, d)| visible(&d.scope).count());
        if let Some((id, _)) = enclosing {
            return Some(*id);
        }

        members
            .iter()
            .all(|(_, d)| d.usr == first.usr)
            .then_some(first_id)
    }

    fn follow_alias(&self, id: usize) -> usize {
        let decl = &self.decls[id];
        let Some(target) = decl.alias_of.as_ref() else {
            return id;
        };
        let Some((name, qualifiers)) = target.split_last() else {
            return id;
        };

        let resolved = if qualifiers.is_empty() {
            self.candidates(name)
                .find(|(other, d)| *other != id && d.kind != CursorKind::UsingDeclaration)
                .map(|(other, _)| other)
        } else {
            self.candidates(name)
                .find(|(other, d)| {
                    *other != id
                        && d.kind != CursorKind::UsingDeclaration
                        && visible(&d.path).eq(qualifiers.iter().map(String::as_str))
                })
                .map(|(other, _)| other)
        };

        resolved.unwrap_or(id)
    }
}

fn is_local(segment: &str) -> bool {
    segment.starts_with("{local:")
}

/// Scope segments that take part in lookup; anonymous namespaces are
/// transparent
fn visible(scope: &[String]) -> impl Iterator<Item = &str> + Clone {
    scope.iter().map(String::as_str).filter(|s| *s != ANONYMOUS)
}

fn is_visible_from(scope: &[String], chain: &[String]) -> bool {
    let mut chain = visible(chain);
    visible(scope).all(|segment| chain.next() == Some(segment))
}

fn accepts(leaf_kind: &str, kind: CursorKind) -> bool {
    match leaf_kind {
        "type_identifier" => kind.is_type(),
        "namespace_identifier" => kind == CursorKind::Namespace || kind.is_type(),
        "field_identifier" => matches!(kind, CursorKind::Field | CursorKind::Method),
        _ => kind != CursorKind::Namespace,
    }
}

fn usr_tag(kind: CursorKind) -> Option<&'static str> {
    match kind {
        CursorKind::Namespace => Some("N"),
        CursorKind::Class | CursorKind::Struct => Some("S"),
        CursorKind::Union => Some("U"),
        CursorKind::Enum => Some("E"),
        CursorKind::Function | CursorKind::Method => Some("F"),
        CursorKind::Field => Some("FI"),
        CursorKind::Typedef => Some("T"),
        CursorKind::UsingDeclaration => Some("UD"),
        _ => None,
    }
}

fn usr_for(decl: &Declaration, scopes: &HashMap<Vec<String>, CursorKind>, file_name: &str) -> String {
    if decl.kind == CursorKind::MacroDefinition {
        return format!("c:{}@{}@macro@{}", file_name, decl.start_byte, decl.name);
    }
    if decl.kind == CursorKind::Parameter || decl.path.iter().any(|s| is_local(s)) {
        return format!("c:{}@{}@{}", file_name, decl.start_byte, decl.name);
    }

    let mut usr = String::from("c:");
    for depth in 0..decl.path.len() {
        let segment = &decl.path[depth];
        let kind = scopes.get(&decl.path[..=depth]).copied();
        if segment == ANONYMOUS && kind.map_or(true, |k| k == CursorKind::Namespace) {
            usr.push_str("@aN");
            continue;
        }
        let tag = kind.and_then(usr_tag).unwrap_or("N");
        usr.push_str(&format!("@{}@{}", tag, segment));
    }

    match usr_tag(decl.kind) {
        Some(tag) => usr.push_str(&format!("@{}@{}", tag, decl.name)),
        None => usr.push_str(&format!("@{}", decl.name)),
    }
    usr
}

enum Mode {
    Collect,
    Resolve,
}

enum Qualification {
    Unqualified,
    Member,
    Qualified(Vec<String>),
}

/// Pending node and the scope it is walked in
struct Pending<'t> {
    node: Node<'t>,
    scope: Rc<Vec<String>>,
}

struct Walker<'a, 't> {
    table: &'a mut DeclarationTable,
    file: usize,
    source: &'t SourceFile,
    mode: Mode,
}

impl<'a, 't> Walker<'a, 't> {
    fn new(table: &'a mut DeclarationTable, file: usize, source: &'t SourceFile, mode: Mode) -> Self {
        Self {
            table,
            file,
            source,
            mode,
        }
    }

    fn text(&self, node: Node<'t>) -> &'t str {
        self.source.text(node)
    }

    /// Pre-order walk from `root` on an explicit stack, so nesting depth
    /// never grows the call stack
    fn walk(&mut self, root: Node<'t>) {
        let mut stack = vec![Pending {
            node: root,
            scope: Rc::new(Vec::new()),
        }];
        let mut next = Vec::new();

        while let Some(Pending { node, scope }) = stack.pop() {
            self.visit(node, &scope, &mut next);
            stack.extend(next.drain(..).rev());
        }
    }

    /// Handle one node and queue its children, in source order, on `next`
    fn visit(&mut self, node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
        match node.kind() {
            "namespace_definition" => self.namespace(node, scope, next),
            "class_specifier" | "struct_specifier" | "union_specifier" => self.record(node, scope, next),
            "enum_specifier" => self.enumeration(node, scope, next),
            "function_definition" => self.function_definition(node, scope, next),
            "declaration" => {
                self.declaration(node, scope);
                queue_children(node, scope, next);
            }
            "field_declaration" => {
                self.field_declaration(node, scope);
                queue_children(node, scope, next);
            }
            "type_definition" => {
                for declarator in field_children(node, "declarator") {
                    if let Some(name) = innermost_name(declarator) {
                        self.declare(name, CursorKind::Typedef, scope, true);
                    }
                }
                queue_children(node, scope, next);
            }
            "alias_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, CursorKind::Typedef, scope, true);
                }
                queue_children(node, scope, next);
            }
            "using_declaration" => {
                self.using_declaration(node, scope);
                queue_children(node, scope, next);
            }
            "preproc_def" | "preproc_function_def" => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare(name, CursorKind::MacroDefinition, &[], true);
                }
            }
            "lambda_expression" => {
                let mut inner = scope.as_ref().clone();
                inner.push(local_segment(node));
                queue_children(node, &Rc::new(inner), next);
            }
            "preproc_include" | "comment" | "string_literal" | "raw_string_literal" | "char_literal"
            | "system_lib_string" => {}
            "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" => {
                if let Mode::Resolve = self.mode {
                    self.resolve_leaf(node, scope);
                }
            }
            _ => queue_children(node, scope, next),
        }
    }

    fn declare(&mut self, node: Node<'t>, kind: CursorKind, scope: &[String], is_definition: bool) {
        self.declare_with(node, kind, scope.to_vec(), scope.to_vec(), is_definition, None);
    }

    fn declare_with(
        &mut self,
        node: Node<'t>,
        kind: CursorKind,
        scope: Vec<String>,
        path: Vec<String>,
        is_definition: bool,
        alias_of: Option<Vec<String>>,
    ) {
        if !matches!(self.mode, Mode::Collect) {
            return;
        }

        let key = (self.file, node.id());
        if self.table.declared.contains_key(&key) {
            return;
        }

        let name = self.text(node).to_string();
        if name.is_empty() {
            return;
        }

        let id = self.table.decls.len();
        self.table.decls.push(Declaration {
            name,
            kind,
            usr: String::new(),
            scope,
            path,
            file: self.file,
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            is_definition,
            alias_of,
        });
        self.table.declared.insert(key, id);
    }

    fn namespace(&mut self, node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
        let segments: Vec<String> = match node.child_by_field_name("name") {
            Some(name) if name.kind() == "nested_namespace_specifier" => self
                .text(name)
                .split("::")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(name) => {
                self.declare(name, CursorKind::Namespace, scope, true);
                vec![self.text(name).to_string()]
            }
            None => vec![ANONYMOUS.to_string()],
        };

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner = scope.as_ref().clone();
            inner.extend(segments);
            next.push(Pending {
                node: body,
                scope: Rc::new(inner),
            });
        }
    }

    fn record(&mut self, node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
        let kind = match node.kind() {
            "class_specifier" => CursorKind::Class,
            "struct_specifier" => CursorKind::Struct,
            _ => CursorKind::Union,
        };
        let body = node.child_by_field_name("body");
        let name = node
            .child_by_field_name("name")
            .and_then(|n| split_name(n, self.source));

        let mut declared_scope = scope.as_ref().clone();
        if let Some((qualifiers, leaf)) = &name {
            declared_scope.extend(qualifiers.iter().cloned());
            if body.is_some() || is_forward_declaration(node) {
                self.declare(*leaf, kind, &declared_scope, body.is_some());
            }
        }

        // Name, base classes and attributes live in the enclosing scope
        let mut walker = node.walk();
        for child in node.named_children(&mut walker).filter(|child| Some(*child) != body) {
            next.push(Pending {
                node: child,
                scope: Rc::clone(scope),
            });
        }

        if let Some(body) = body {
            let record_name = name
                .map(|(_, leaf)| self.text(leaf).to_string())
                .unwrap_or_else(|| ANONYMOUS.to_string());
            declared_scope.push(record_name);
            next.push(Pending {
                node: body,
                scope: Rc::new(declared_scope),
            });
        }
    }

    fn enumeration(&mut self, node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
        let body = node.child_by_field_name("body");
        let name = node.child_by_field_name("name");
        let scoped = has_token(node, "class") || has_token(node, "struct");

        if let Some(name) = name {
            if body.is_some() || is_forward_declaration(node) {
                self.declare(name, CursorKind::Enum, scope, body.is_some());
            }
        }

        let mut walker = node.walk();
        for child in node.named_children(&mut walker).filter(|child| Some(*child) != body) {
            next.push(Pending {
                node: child,
                scope: Rc::clone(scope),
            });
        }

        let Some(body) = body else {
            return;
        };

        let mut path = scope.as_ref().clone();
        path.push(
            name.map(|n| self.text(n).to_string())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
        );
        let lookup = if scoped { path.clone() } else { scope.as_ref().clone() };
        let value_scope = Rc::new(path.clone());

        let mut walker = body.walk();
        let enumerators: Vec<Node<'t>> = body
            .named_children(&mut walker)
            .filter(|child| child.kind() == "enumerator")
            .collect();
        for enumerator in enumerators {
            if let Some(constant) = enumerator.child_by_field_name("name") {
                self.declare_with(constant, CursorKind::EnumConstant, lookup.clone(), path.clone(), true, None);
            }
            if let Some(value) = enumerator.child_by_field_name("value") {
                next.push(Pending {
                    node: value,
                    scope: Rc::clone(&value_scope),
                });
            }
        }
    }

    fn function_definition(&mut self, node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
        let function = node
            .child_by_field_name("declarator")
            .and_then(find_function_declarator);
        let name = function
            .and_then(|f| f.child_by_field_name("declarator"))
            .and_then(|n| split_name(n, self.source));

        let mut inner = scope.as_ref().clone();
        if let Some((qualifiers, leaf)) = &name {
            inner.extend(qualifiers.iter().cloned());
            self.declare(*leaf, CursorKind::Function, &inner, true);
        }

        // The return type is looked up outside the function
        let return_type = node.child_by_field_name("type");
        if let Some(ty) = return_type {
            next.push(Pending {
                node: ty,
                scope: Rc::clone(scope),
            });
        }

        inner.push(local_segment(node));
        if let Some(parameters) = function.and_then(|f| f.child_by_field_name("parameters")) {
            self.parameters(parameters, &inner);
        }

        let inner = Rc::new(inner);
        let mut walker = node.walk();
        for child in node.named_children(&mut walker).filter(|child| Some(*child) != return_type) {
            next.push(Pending {
                node: child,
                scope: Rc::clone(&inner),
            });
        }
    }

    fn parameters(&mut self, list: Node<'t>, scope: &[String]) {
        let mut walker = list.walk();
        let params: Vec<Node<'t>> = list.named_children(&mut walker).collect();
        for param in params {
            if !matches!(param.kind(), "parameter_declaration" | "optional_parameter_declaration") {
                continue;
            }
            let name = param
                .child_by_field_name("declarator")
                .and_then(innermost_name)
                .filter(|n| n.kind() == "identifier");
            if let Some(name) = name {
                self.declare(name, CursorKind::Parameter, scope, true);
            }
        }
    }

    fn declaration(&mut self, node: Node<'t>, scope: &[String]) {
        for declarator in field_children(node, "declarator") {
            let core = unwrap_declarator(declarator);
            match core.kind() {
                "function_declarator" => {
                    let target = core.child_by_field_name("declarator");
                    match target.and_then(|n| split_name(n, self.source)) {
                        Some((qualifiers, leaf)) => {
                            let mut declared = scope.to_vec();
                            declared.extend(qualifiers);
                            self.declare(leaf, CursorKind::Function, &declared, false);
                        }
                        None => {
                            // Function pointer variable
                            if let Some(name) = target.and_then(innermost_name) {
                                self.declare(name, CursorKind::Variable, scope, true);
                            }
                        }
                    }
                }
                "identifier" => self.declare(core, CursorKind::Variable, scope, true),
                "qualified_identifier" => {
                    if let Some((qualifiers, leaf)) = split_name(core, self.source) {
                        let mut declared = scope.to_vec();
                        declared.extend(qualifiers);
                        self.declare(leaf, CursorKind::Variable, &declared, true);
                    }
                }
                _ => {}
            }
        }
    }

    fn field_declaration(&mut self, node: Node<'t>, scope: &[String]) {
        for declarator in field_children(node, "declarator") {
            let core = unwrap_declarator(declarator);
            match core.kind() {
                "function_declarator" => {
                    let target = core.child_by_field_name("declarator");
                    match target.and_then(|n| split_name(n, self.source)) {
                        Some((qualifiers, leaf)) if qualifiers.is_empty() => {
                            self.declare(leaf, CursorKind::Function, scope, false);
                        }
                        Some(_) => {}
                        None => {
                            if let Some(name) = target.and_then(innermost_name) {
                                self.declare(name, CursorKind::Field, scope, true);
                            }
                        }
                    }
                }
                "field_identifier" => self.declare(core, CursorKind::Field, scope, true),
                _ => {}
            }
        }
    }

    fn using_declaration(&mut self, node: Node<'t>, scope: &[String]) {
        if has_token(node, "namespace") {
            return;
        }

        let mut walker = node.walk();
        let target = node
            .named_children(&mut walker)
            .find(|child| matches!(child.kind(), "identifier" | "qualified_identifier"));
        let Some((qualifiers, leaf)) = target.and_then(|t| split_name(t, self.source)) else {
            return;
        };

        let mut alias = qualifiers;
        alias.push(self.text(leaf).to_string());
        self.declare_with(
            leaf,
            CursorKind::UsingDeclaration,
            scope.to_vec(),
            scope.to_vec(),
            false,
            Some(alias),
        );
    }

    fn resolve_leaf(&mut self, node: Node<'t>, scope: &[String]) {
        let key = (self.file, node.id());
        if self.table.declared.contains_key(&key) {
            return;
        }

        let name = self.text(node);
        if name.is_empty() {
            return;
        }

        let target = match qualification(node, self.source) {
            Qualification::Member => self.table.lookup_member(name, scope),
            Qualification::Qualified(qualifiers) => self.table.lookup_qualified(&qualifiers, name, scope, node.kind()),
            Qualification::Unqualified => self.table.lookup(name, scope, node.kind()),
        };

        if let Some(id) = target {
            self.table.references.insert(key, id);
        }
    }
}

fn local_segment(node: Node<'_>) -> String {
    format!("{{local:{}}}", node.id())
}

/// Queue every named child of `node` in `scope`
fn queue_children<'t>(node: Node<'t>, scope: &Rc<Vec<String>>, next: &mut Vec<Pending<'t>>) {
    let mut walker = node.walk();
    for child in node.named_children(&mut walker) {
        next.push(Pending {
            node: child,
            scope: Rc::clone(scope),
        });
    }
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut walker = node.walk();
    node.children_by_field_name(field, &mut walker).collect()
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut walker = node.walk();
    let found = node
        .children(&mut walker)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}

/// A bodyless specifier directly followed by `;`
fn is_forward_declaration(node: Node<'_>) -> bool {
    node.next_sibling().is_some_and(|sibling| sibling.kind() == ";")
}

/// Strip initializers, pointers, references, arrays and parentheses
fn unwrap_declarator(mut node: Node<'_>) -> Node<'_> {
    loop {
        match node.kind() {
            "init_declarator" | "pointer_declarator" | "reference_declarator" | "array_declarator"
            | "parenthesized_declarator" | "attributed_declarator" => {
                let next = node.child_by_field_name("declarator").or_else(|| {
                    let mut walker = node.walk();
                    let last = node.named_children(&mut walker).last();
                    last
                });
                match next {
                    Some(next) => node = next,
                    None => return node,
                }
            }
            _ => return node,
        }
    }
}

fn find_function_declarator(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        let core = unwrap_declarator(current);
        if core.kind() == "function_declarator" {
            return Some(core);
        }
        if core == current {
            return None;
        }
        current = core;
    }
}

/// Innermost name leaf of any declarator, through function declarators
fn innermost_name(node: Node<'_>) -> Option<Node<'_>> {
    let mut current = node;
    loop {
        let core = unwrap_declarator(current);
        match core.kind() {
            "function_declarator" => current = core.child_by_field_name("declarator")?,
            "identifier" | "field_identifier" | "type_identifier" => return Some(core),
            _ => return None,
        }
    }
}

/// Split a declared name into its qualifier segments and the name node
fn split_name<'t>(node: Node<'t>, source: &SourceFile) -> Option<(Vec<String>, Node<'t>)> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "namespace_identifier" | "destructor_name"
        | "operator_name" => Some((Vec::new(), node)),
        "template_function" | "template_type" | "template_method" => {
            split_name(node.child_by_field_name("name")?, source)
        }
        "qualified_identifier" => {
            let name = node.child_by_field_name("name")?;
            let (rest, leaf) = split_name(name, source)?;
            let mut qualifiers: Vec<String> = node
                .child_by_field_name("scope")
                .map(|scope| vec![scope_text(scope, source)])
                .unwrap_or_default();
            qualifiers.extend(rest);
            Some((qualifiers, leaf))
        }
        _ => None,
    }
}

fn scope_text(scope: Node<'_>, source: &SourceFile) -> String {
    let named = if scope.kind() == "template_type" {
        scope.child_by_field_name("name").unwrap_or(scope)
    } else {
        scope
    };
    source.text(named).to_string()
}

fn qualification(node: Node<'_>, source: &SourceFile) -> Qualification {
    let Some(parent) = node.parent() else {
        return Qualification::Unqualified;
    };

    let wraps_name = matches!(parent.kind(), "template_type" | "template_function" | "template_method")
        && parent.child_by_field_name("name") == Some(node);
    let anchor = if wraps_name || parent.kind() == "destructor_name" {
        parent
    } else {
        node
    };

    let Some(parent) = anchor.parent() else {
        return Qualification::Unqualified;
    };

    if parent.kind() == "field_expression" && parent.child_by_field_name("field") == Some(anchor) {
        return Qualification::Member;
    }
    if parent.kind() != "qualified_identifier" {
        return Qualification::Unqualified;
    }

    let mut segments = Vec::new();
    if parent.child_by_field_name("name") == Some(anchor) {
        if let Some(scope) = parent.child_by_field_name("scope") {
            segments.push(scope_text(scope, source));
        }
    }

    // A scope leaf is qualified by whatever qualifies its qualified_identifier
    let mut current = parent;
    while let Some(outer) = current.parent() {
        if outer.kind() != "qualified_identifier" || outer.child_by_field_name("name") != Some(current) {
            break;
        }
        if let Some(scope) = outer.child_by_field_name("scope") {
            segments.insert(0, scope_text(scope, source));
        }
        current = outer;
    }

    if segments.is_empty() {
        Qualification::Unqualified
    } else {
        Qualification::Qualified(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source_file(name: &str, source: &str) -> SourceFile {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_cpp::LANGUAGE.into()).unwrap();
        let tree = parser.parse(source, None).unwrap();
        SourceFile::new(PathBuf::from(name), source.to_string(), tree)
    }

    fn usrs(table: &DeclarationTable, name: &str) -> Vec<String> {
        table.candidates(name).map(|(_, d)| d.usr.clone()).collect()
    }

    #[test]
    fn test_scoped_usrs() {
        let file = source_file(
            "a.cpp",
            "namespace geo {\n\
             struct Point { int x; void move(int dx); };\n\
             enum Color { Red };\n\
             enum class Mode { Fast };\n\
             }\n\
             void geo::Point::move(int dx) { x += dx; }\n\
             int free_function() { return 0; }\n",
        );
        let table = DeclarationTable::build(std::slice::from_ref(&file));

        assert_eq!(usrs(&table, "Point"), vec!["c:@N@geo@S@Point"]);
        assert_eq!(usrs(&table, "x"), vec!["c:@N@geo@S@Point@FI@x"]);
        assert_eq!(usrs(&table, "move"), vec!["c:@N@geo@S@Point@F@move", "c:@N@geo@S@Point@F@move"]);
        assert_eq!(usrs(&table, "Red"), vec!["c:@N@geo@E@Color@Red"]);
        assert_eq!(usrs(&table, "Fast"), vec!["c:@N@geo@E@Mode@Fast"]);
        assert_eq!(usrs(&table, "free_function"), vec!["c:@F@free_function"]);

        let kinds: Vec<CursorKind> = table.candidates("move").map(|(_, d)| d.kind).collect();
        assert_eq!(kinds, vec![CursorKind::Method, CursorKind::Method]);
        assert!(table.definition_of("c:@N@geo@S@Point@F@move").unwrap().is_definition);
    }

    #[test]
    fn test_locals_and_macros_are_file_scoped() {
        let file = source_file("m.cpp", "#define LIMIT 4\nint f(int n) { int total = n; return total; }\n");
        let table = DeclarationTable::build(std::slice::from_ref(&file));

        let limit = usrs(&table, "LIMIT");
        assert_eq!(limit, vec!["c:m.cpp@8@macro@LIMIT"]);

        let total = usrs(&table, "total");
        assert_eq!(total.len(), 1);
        assert!(total[0].starts_with("c:m.cpp@"));
    }

    #[test]
    fn test_unqualified_lookup_prefers_innermost_scope() {
        let file = source_file(
            "s.cpp",
            "int value;\nnamespace inner { int value; int get() { return value; } }\nint top() { return value; }\n",
        );
        let table = DeclarationTable::build(std::slice::from_ref(&file));

        let resolved: Vec<&str> = table.references.values().map(|&id| table.decls[id].usr.as_str()).collect();
        assert!(resolved.contains(&"c:@N@inner@value"));
        assert!(resolved.contains(&"c:@value"));
    }

    #[test]
    fn test_member_lookup_requires_unique_usr() {
        let file = source_file(
            "f.cpp",
            "struct A { int size; };\nstruct B { int size; };\nstruct C { int only; };\n\
             int use(A a, C c) { return a.size + c.only; }\n",
        );
        let table = DeclarationTable::build(std::slice::from_ref(&file));

        let resolved: Vec<&str> = table.references.values().map(|&id| table.decls[id].usr.as_str()).collect();
        assert!(resolved.contains(&"c:@S@C@FI@only"));
        assert!(!resolved.iter().any(|usr| usr.ends_with("@FI@size")));
    }
}
