use std::sync::Arc;

use crate::core::spec::{CodeLocation, SpecBody, SpecContext, SpecResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flag {
    None,
    Focused,
    Pending,
}

struct Container {
    text: String,
    flag: Flag,
    before_each: Vec<SpecBody>,
    after_each: Vec<SpecBody>,
    children: Vec<Node>,
}

impl Container {
    fn new(text: &str, flag: Flag) -> Self {
        Self {
            text: text.to_string(),
            flag,
            before_each: Vec::new(),
            after_each: Vec::new(),
            children: Vec::new(),
        }
    }
}

struct SpecNode {
    text: String,
    flag: Flag,
    body: SpecBody,
    location: CodeLocation,
}

enum Node {
    Container(Container),
    Spec(SpecNode),
}

/// A spec ready to run, with the hooks of every enclosing container resolved.
#[derive(Clone)]
pub struct Spec {
    pub component_texts: Vec<String>,
    pub body: SpecBody,
    /// Outermost container first.
    pub before_each: Vec<SpecBody>,
    /// Innermost container first.
    pub after_each: Vec<SpecBody>,
    pub focused: bool,
    pub pending: bool,
    pub location: CodeLocation,
    /// Index of the top-level node this spec was declared under.
    pub group: usize,
}

impl Spec {
    pub fn full_text(&self) -> String {
        self.component_texts.join(" ")
    }
}

/// Declarative registry of containers, specs and suite-level setup.
///
/// ```
/// use funcsuite::core::tree::SpecTree;
///
/// let mut tree = SpecTree::new();
/// tree.describe("arithmetic", |t| {
///     t.it("adds", |ctx| ctx.expect_eq(1 + 1, 2));
/// });
/// assert_eq!(tree.flatten().len(), 1);
/// ```
pub struct SpecTree {
    stack: Vec<Container>,
    before_suite: Option<SpecBody>,
    after_suite: Option<SpecBody>,
    errors: Vec<String>,
}

impl Default for SpecTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecTree {
    pub fn new() -> Self {
        Self {
            stack: vec![Container::new("", Flag::None)],
            before_suite: None,
            after_suite: None,
            errors: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut Container {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn push_container<F>(&mut self, text: &str, flag: Flag, build: F)
    where
        F: FnOnce(&mut SpecTree),
    {
        self.stack.push(Container::new(text, flag));
        build(self);
        if let Some(container) = self.stack.pop() {
            self.current().children.push(Node::Container(container));
        }
    }

    fn push_spec<F>(&mut self, text: &str, flag: Flag, body: F, location: CodeLocation)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.current().children.push(Node::Spec(SpecNode {
            text: text.to_string(),
            flag,
            body: Arc::new(body),
            location,
        }));
    }

    pub fn describe<F: FnOnce(&mut SpecTree)>(&mut self, text: &str, build: F) {
        self.push_container(text, Flag::None, build);
    }

    pub fn context<F: FnOnce(&mut SpecTree)>(&mut self, text: &str, build: F) {
        self.push_container(text, Flag::None, build);
    }

    pub fn fdescribe<F: FnOnce(&mut SpecTree)>(&mut self, text: &str, build: F) {
        self.push_container(text, Flag::Focused, build);
    }

    pub fn pdescribe<F: FnOnce(&mut SpecTree)>(&mut self, text: &str, build: F) {
        self.push_container(text, Flag::Pending, build);
    }

    #[track_caller]
    pub fn it<F>(&mut self, text: &str, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.push_spec(text, Flag::None, body, CodeLocation::caller());
    }

    #[track_caller]
    pub fn fit<F>(&mut self, text: &str, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.push_spec(text, Flag::Focused, body, CodeLocation::caller());
    }

    #[track_caller]
    pub fn pit<F>(&mut self, text: &str, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.push_spec(text, Flag::Pending, body, CodeLocation::caller());
    }

    pub fn before_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.current().before_each.push(Arc::new(body));
    }

    pub fn after_each<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        self.current().after_each.push(Arc::new(body));
    }

    pub fn before_suite<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        if self.before_suite.is_some() {
            self.errors.push("before_suite registered more than once".to_string());
            return;
        }
        self.before_suite = Some(Arc::new(body));
    }

    pub fn after_suite<F>(&mut self, body: F)
    where
        F: Fn(&SpecContext) -> SpecResult + Send + Sync + 'static,
    {
        if self.after_suite.is_some() {
            self.errors.push("after_suite registered more than once".to_string());
            return;
        }
        self.after_suite = Some(Arc::new(body));
    }

    pub fn before_suite_body(&self) -> Option<SpecBody> {
        self.before_suite.clone()
    }

    pub fn after_suite_body(&self) -> Option<SpecBody> {
        self.after_suite.clone()
    }

    /// Registration mistakes collected while building the tree.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// All specs in definition order.
    pub fn flatten(&self) -> Vec<Spec> {
        let mut specs = Vec::new();
        let root = &self.stack[0];
        for (group, child) in root.children.iter().enumerate() {
            let scope = Scope {
                texts: Vec::new(),
                before_each: root.before_each.clone(),
                after_each: root.after_each.clone(),
                focused: false,
                pending: false,
            };
            collect(child, group, &scope, &mut specs);
        }
        specs
    }
}

#[derive(Clone)]
struct Scope {
    texts: Vec<String>,
    before_each: Vec<SpecBody>,
    after_each: Vec<SpecBody>,
    focused: bool,
    pending: bool,
}

fn has_focused_descendant(container: &Container) -> bool {
    container.children.iter().any(|child| match child {
        Node::Container(inner) => inner.flag == Flag::Focused || has_focused_descendant(inner),
        Node::Spec(spec) => spec.flag == Flag::Focused,
    })
}

fn collect(node: &Node, group: usize, scope: &Scope, out: &mut Vec<Spec>) {
    match node {
        Node::Container(container) => {
            let mut inner = scope.clone();
            inner.texts.push(container.text.clone());
            inner.before_each.extend(container.before_each.iter().cloned());
            // after-each hooks unwind inner to outer
            let mut after = container.after_each.clone();
            after.extend(inner.after_each.drain(..));
            inner.after_each = after;
            // a nested focused node takes over the container's focus
            inner.focused |= container.flag == Flag::Focused && !has_focused_descendant(container);
            inner.pending |= container.flag == Flag::Pending;

            for child in &container.children {
                collect(child, group, &inner, out);
            }
        }
        Node::Spec(spec) => {
            let mut texts = scope.texts.clone();
            texts.push(spec.text.clone());
            out.push(Spec {
                component_texts: texts,
                body: spec.body.clone(),
                before_each: scope.before_each.clone(),
                after_each: scope.after_each.clone(),
                focused: scope.focused || spec.flag == Flag::Focused,
                pending: scope.pending || spec.flag == Flag::Pending,
                location: spec.location.clone(),
                group,
            });
        }
    }
}
