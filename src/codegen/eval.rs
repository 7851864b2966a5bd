//! Tree-walking evaluator for generated method bodies
//!
//! Used by tests to check what generated accessors actually do. Generated
//! classes run their own members; runtime framework objects are plain slot
//! bags whose methods do nothing.

use crate::descriptor::ScalarType;
use crate::graph::{
    ClientType, Expr, GeneratedTypeGraph, Literal, MethodDecl, MethodKind, Member, PropertyDecl,
    Stmt, TypeDecl,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub(crate) type ObjRef = Rc<RefCell<Object>>;

#[derive(Debug, Default)]
pub(crate) struct Object {
    class: Option<(String, String)>,
    slots: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Obj(ObjRef),
    Key(Vec<Value>),
    Method(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Obj(a), Self::Obj(b)) => Rc::ptr_eq(a, b),
            (Self::Key(a), Self::Key(b)) => a == b,
            (Self::Method(a), Self::Method(b)) => a == b,
            _ => false,
        }
    }
}

fn default_of(ty: &ClientType) -> Value {
    match ty {
        ClientType::Scalar(ScalarType::Bool) => Value::Bool(false),
        ClientType::Scalar(scalar) if scalar.is_reference() => Value::Null,
        ClientType::Scalar(_) => Value::Int(0),
        _ => Value::Null,
    }
}

struct Frame {
    this: Option<ObjRef>,
    value: Value,
    locals: HashMap<String, Value>,
}

enum Flow {
    Next,
    Return(Value),
}

pub(crate) struct Interpreter<'g> {
    graph: &'g GeneratedTypeGraph,
}

impl<'g> Interpreter<'g> {
    pub(crate) fn new(graph: &'g GeneratedTypeGraph) -> Self {
        Self { graph }
    }

    /// Base chain of a generated class, most derived first
    fn chain(&self, class: &Option<(String, String)>) -> Vec<&'g TypeDecl> {
        let mut chain = Vec::new();
        let mut current = class
            .as_ref()
            .and_then(|(ns, name)| self.graph.find_type(ns, name));
        while let Some(decl) = current {
            chain.push(decl);
            current = match &decl.base {
                Some(ClientType::Named(base)) => self.graph.find_type(&base.namespace, &base.name),
                _ => None,
            };
        }
        chain
    }

    fn class_of(obj: &ObjRef) -> Option<(String, String)> {
        obj.borrow().class.clone()
    }

    fn find_property(&self, obj: &ObjRef, name: &str) -> Option<&'g PropertyDecl> {
        self.chain(&Self::class_of(obj))
            .into_iter()
            .find_map(|decl| decl.property(name))
    }

    fn find_method(&self, obj: &ObjRef, name: &str) -> Option<&'g MethodDecl> {
        self.chain(&Self::class_of(obj))
            .into_iter()
            .find_map(|decl| decl.method(name))
    }

    pub(crate) fn instantiate(&self, namespace: &str, name: &str) -> ObjRef {
        let class = Some((namespace.to_string(), name.to_string()));
        let mut slots = HashMap::new();
        for decl in self.chain(&class) {
            for member in &decl.members {
                if let Member::Field(field) = member {
                    slots.insert(field.name.clone(), default_of(&field.ty));
                }
            }
        }
        Rc::new(RefCell::new(Object { class, slots }))
    }

    pub(crate) fn get(&self, obj: &ObjRef, property: &str) -> Value {
        match self.find_property(obj, property) {
            Some(decl) => self.run(Some(obj.clone()), Value::Null, HashMap::new(), &decl.getter),
            None => {
                let slot = obj.borrow().slots.get(property).cloned();
                slot.unwrap_or(Value::Null)
            }
        }
    }

    pub(crate) fn set(&self, obj: &ObjRef, property: &str, value: Value) {
        match self.find_property(obj, property).and_then(|p| p.setter.as_ref()) {
            Some(setter) => {
                self.run(Some(obj.clone()), value, HashMap::new(), &setter.body);
            }
            None => {
                obj.borrow_mut().slots.insert(property.to_string(), value);
            }
        }
    }

    pub(crate) fn call(&self, obj: &ObjRef, method: &str, args: Vec<Value>) -> Value {
        match self.find_method(obj, method) {
            Some(decl) if decl.kind != MethodKind::Hook => {
                let locals = decl
                    .parameters
                    .iter()
                    .map(|p| p.name.clone())
                    .zip(args)
                    .collect();
                self.run(Some(obj.clone()), Value::Null, locals, &decl.body)
            }
            _ => Value::Null,
        }
    }

    fn run(
        &self,
        this: Option<ObjRef>,
        value: Value,
        locals: HashMap<String, Value>,
        body: &[Stmt],
    ) -> Value {
        let mut frame = Frame {
            this,
            value,
            locals,
        };
        match self.exec(&mut frame, body) {
            Flow::Return(value) => value,
            Flow::Next => Value::Null,
        }
    }

    fn exec(&self, frame: &mut Frame, body: &[Stmt]) -> Flow {
        for stmt in body {
            match stmt {
                Stmt::Let(name, expr) => {
                    let value = self.eval(frame, expr);
                    frame.locals.insert(name.clone(), value);
                }
                Stmt::Assign(target, expr) => {
                    let value = self.eval(frame, expr);
                    match target {
                        Expr::Field(owner, field) => {
                            if let Value::Obj(obj) = self.eval(frame, owner) {
                                obj.borrow_mut().slots.insert(field.clone(), value);
                            }
                        }
                        Expr::Local(name) => {
                            frame.locals.insert(name.clone(), value);
                        }
                        _ => {}
                    }
                }
                Stmt::SetProperty {
                    target,
                    property,
                    value,
                } => {
                    let value = self.eval(frame, value);
                    if let Value::Obj(obj) = self.eval(frame, target) {
                        self.set(&obj, property, value);
                    }
                }
                Stmt::Expr(expr) => {
                    self.eval(frame, expr);
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    let branch = if self.eval(frame, cond) == Value::Bool(true) {
                        then
                    } else {
                        otherwise
                    };
                    if let Flow::Return(value) = self.exec(frame, branch) {
                        return Flow::Return(value);
                    }
                }
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval(frame, expr),
                        None => Value::Null,
                    };
                    return Flow::Return(value);
                }
            }
        }
        Flow::Next
    }

    fn eval(&self, frame: &mut Frame, expr: &Expr) -> Value {
        match expr {
            Expr::This => frame.this.clone().map(Value::Obj).unwrap_or(Value::Null),
            Expr::Value => frame.value.clone(),
            Expr::Null => Value::Null,
            Expr::Literal(Literal::Bool(b)) => Value::Bool(*b),
            Expr::Literal(Literal::Int(i)) => Value::Int(*i),
            Expr::Literal(Literal::Str(s)) => Value::Str(s.clone()),
            Expr::Default(ty) => default_of(ty),
            Expr::Local(name) => frame.locals.get(name).cloned().unwrap_or(Value::Null),
            Expr::Field(owner, field) => match self.eval(frame, owner) {
                Value::Obj(obj) => {
                    let slot = obj.borrow().slots.get(field).cloned();
                    slot.unwrap_or(Value::Null)
                }
                _ => Value::Null,
            },
            Expr::Property(owner, property) => match self.eval(frame, owner) {
                Value::Obj(obj) => self.get(&obj, property),
                _ => Value::Null,
            },
            Expr::Call {
                target,
                method,
                args,
                ..
            } => {
                let target = self.eval(frame, target);
                let args = args.iter().map(|a| self.eval(frame, a)).collect();
                match target {
                    Value::Obj(obj) => self.call(&obj, method, args),
                    _ => Value::Null,
                }
            }
            Expr::StaticCall { args, .. } => {
                Value::Key(args.iter().map(|a| self.eval(frame, a)).collect())
            }
            Expr::New(_, _) => Value::Obj(Rc::new(RefCell::new(Object::default()))),
            Expr::MethodRef(name) => Value::Method(name.clone()),
            Expr::TypeOf(_) | Expr::Parameters(_) => Value::Null,
            Expr::Eq(l, r) => Value::Bool(self.eval(frame, l) == self.eval(frame, r)),
            Expr::Ne(l, r) => Value::Bool(self.eval(frame, l) != self.eval(frame, r)),
            Expr::And(items) => Value::Bool(
                items
                    .iter()
                    .all(|item| self.eval(frame, item) == Value::Bool(true)),
            ),
            Expr::Or(items) => Value::Bool(
                items
                    .iter()
                    .any(|item| self.eval(frame, item) == Value::Bool(true)),
            ),
            Expr::IsNull(inner) => Value::Bool(self.eval(frame, inner) == Value::Null),
            Expr::IsNotNull(inner) => Value::Bool(self.eval(frame, inner) != Value::Null),
        }
    }
}
