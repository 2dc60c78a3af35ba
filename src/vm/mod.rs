//! Reference interpreter.
//!
//! Executes a sealed [`Program`] with exactly the semantics of the emitted
//! interpreter: decrypt, strip padding, seed the scope with intrinsics, and
//! run the dispatch loop. The handler table is the `step` match below; one
//! iteration reads an opcode, its operand bytes (width from the shared
//! table), and applies the handler.
//!
//! Function values hold their body as source text. Calling one re-enters
//! the frontend and the lowerer, then dispatches the sub-program in a child
//! of the function's defining scope. That re-entry is the dynamic-compile
//! facility of this host.

pub mod error;
pub mod intrinsics;
pub mod ops;
pub mod scope;
pub mod value;

use std::rc::Rc;

pub use error::RuntimeError;
pub use value::Value;

use crate::encoder::{bytecode, strings};
use crate::lowerer::{self, UnsupportedPolicy};
use crate::opcodes::{self, call, exc, jump, object, op, special, stack as stk, var};
use crate::parser;
use crate::pool::Const;
use crate::program::Program;
use scope::Scope;
use value::FunctionValue;

/// Read-side view of a constant pool, decoding wrapped strings on access.
pub(crate) struct PoolView<'a> {
    entries: &'a [Const],
    key: Option<&'a str>,
}

impl<'a> PoolView<'a> {
    pub(crate) fn new(entries: &'a [Const], key: Option<&'a str>) -> Self {
        Self { entries, key }
    }

    fn get(&self, idx: u8) -> Result<&Const, RuntimeError> {
        self.entries
            .get(idx as usize)
            .ok_or(RuntimeError::BadConstIndex(idx))
    }

    fn decode(&self, encoded: &str) -> Result<String, RuntimeError> {
        let key = self.key.ok_or_else(|| {
            RuntimeError::TypeMismatch("encoded constant without a pool key".to_string())
        })?;
        Ok(strings::decode_entry(encoded, key)?)
    }

    fn value(&self, idx: u8) -> Result<Value, RuntimeError> {
        Ok(match self.get(idx)? {
            Const::Number(n) => Value::Number(*n),
            Const::Bool(b) => Value::Bool(*b),
            Const::Null => Value::Null,
            Const::Str(s) | Const::Name(s) | Const::Source(s) => Value::Str(s.clone()),
            Const::Encoded { value } => Value::Str(self.decode(value)?),
            Const::Offset(d) => Value::Number(*d as f64),
            Const::StrList(items) => {
                Value::array(items.iter().map(|s| Value::Str(s.clone())).collect())
            }
        })
    }

    fn name(&self, idx: u8) -> Result<String, RuntimeError> {
        match self.get(idx)? {
            Const::Name(s) | Const::Str(s) | Const::Source(s) => Ok(s.clone()),
            Const::Encoded { value } => self.decode(value),
            other => Err(RuntimeError::TypeMismatch(format!(
                "constant {idx} is not a name: {other:?}"
            ))),
        }
    }

    fn offset(&self, idx: u8) -> Result<i32, RuntimeError> {
        self.get(idx)?
            .as_offset()
            .ok_or_else(|| RuntimeError::TypeMismatch(format!("constant {idx} is not an offset")))
    }

    fn str_list(&self, idx: u8) -> Result<Vec<String>, RuntimeError> {
        match self.get(idx)? {
            Const::StrList(items) => Ok(items.clone()),
            other => Err(RuntimeError::TypeMismatch(format!(
                "constant {idx} is not a name list: {other:?}"
            ))),
        }
    }
}

/// An active try region, pcs already absolute.
struct TryFrame {
    catch_pc: usize,
    #[allow(dead_code)]
    finally_pc: usize,
}

/// What a handler asks the dispatch loop to do next.
enum Flow {
    Continue,
    Jump(i32),
    Return(Value),
}

pub struct Interpreter {
    pub max_call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self { max_call_depth: 64 }
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a sealed program to its terminal value.
    pub fn run(&self, program: &Program) -> Result<Value, RuntimeError> {
        self.run_inner(program, false).map(|(value, _)| value)
    }

    /// Run and also record the top-level opcode trace.
    pub fn run_traced(&self, program: &Program) -> Result<(Value, Vec<u8>), RuntimeError> {
        self.run_inner(program, true)
    }

    fn run_inner(
        &self,
        program: &Program,
        trace: bool,
    ) -> Result<(Value, Vec<u8>), RuntimeError> {
        let code = bytecode::open(program)?;
        let globals = Scope::root();
        intrinsics::install(&globals);
        let view = PoolView::new(&program.pool, program.pool_key.as_deref());
        let mut exec = Execution {
            depth: 0,
            max_depth: self.max_call_depth,
        };
        let mut trace_buf = Vec::new();
        let trace_ref = if trace { Some(&mut trace_buf) } else { None };
        let value = exec.dispatch(&code, &view, &globals, &Value::Undefined, true, trace_ref)?;
        Ok((value, trace_buf))
    }
}

struct Execution {
    depth: usize,
    max_depth: usize,
}

impl Execution {
    fn dispatch(
        &mut self,
        code: &[u8],
        pool: &PoolView,
        scope: &Rc<Scope>,
        this: &Value,
        top_level: bool,
        mut trace: Option<&mut Vec<u8>>,
    ) -> Result<Value, RuntimeError> {
        let mut stack: Vec<Value> = Vec::new();
        let mut try_blocks: Vec<TryFrame> = Vec::new();
        let mut completion = Value::Undefined;
        let mut pc = 0usize;

        loop {
            if pc >= code.len() {
                return Err(RuntimeError::TruncatedStream);
            }
            let opcode_pc = pc;
            let opcode = code[pc];
            pc += 1;
            let width =
                opcodes::operand_count(opcode).ok_or(RuntimeError::BadOpcode(opcode))?;
            if pc + width > code.len() {
                return Err(RuntimeError::TruncatedStream);
            }
            let operands: Vec<u8> = code[pc..pc + width].to_vec();
            pc += width;
            if let Some(buf) = trace.as_mut() {
                buf.push(opcode);
            }

            let outcome = self.step(
                opcode,
                opcode_pc,
                &operands,
                &mut stack,
                &mut try_blocks,
                pool,
                scope,
                this,
                &mut completion,
            );

            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Jump(displacement)) => {
                    let next = pc as i64 + displacement as i64 - 1;
                    if next < 0 || next as usize > code.len() {
                        return Err(RuntimeError::TruncatedStream);
                    }
                    pc = next as usize;
                }
                Ok(Flow::Return(value)) => {
                    // The synthesized top-level terminator returns undefined;
                    // the observable result is then the completion value.
                    if top_level && matches!(value, Value::Undefined) {
                        return Ok(completion);
                    }
                    return Ok(value);
                }
                Err(err) => match try_blocks.pop() {
                    Some(frame) => {
                        stack.push(err.into_value());
                        pc = frame.catch_pc;
                    }
                    None => return Err(err),
                },
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step(
        &mut self,
        opcode: u8,
        opcode_pc: usize,
        operands: &[u8],
        stack: &mut Vec<Value>,
        try_blocks: &mut Vec<TryFrame>,
        pool: &PoolView,
        scope: &Rc<Scope>,
        this: &Value,
        completion: &mut Value,
    ) -> Result<Flow, RuntimeError> {
        match opcode {
            var::LOAD_CONST => {
                stack.push(pool.value(operands[0])?);
            }
            var::LOAD_VAR => {
                let name = pool.name(operands[0])?;
                let value = scope.get(&name).ok_or_else(|| {
                    RuntimeError::TypeMismatch(format!("`{name}` is not defined"))
                })?;
                stack.push(value);
            }
            var::STORE_VAR => {
                let name = pool.name(operands[0])?;
                let value = stack.last().ok_or(RuntimeError::StackUnderflow)?.clone();
                scope.assign(&name, value);
            }
            op::BINARY_OP => {
                let spelling = pool.name(operands[0])?;
                let b = pop(stack)?;
                let a = pop(stack)?;
                stack.push(ops::binary(&spelling, &a, &b)?);
            }
            op::UNARY_OP => {
                let spelling = pool.name(operands[0])?;
                let a = pop(stack)?;
                stack.push(ops::unary(&spelling, &a)?);
            }
            op::LOGICAL_OP => {
                let spelling = pool.name(operands[0])?;
                let b = pop(stack)?;
                let a = pop(stack)?;
                stack.push(ops::logical(&spelling, &a, &b)?);
            }
            call::CALL_FUNCTION => {
                let arity = operands[0] as usize;
                if stack.len() < arity + 1 {
                    return Err(RuntimeError::StackUnderflow);
                }
                let args = stack.split_off(stack.len() - arity);
                let callee = pop(stack)?;
                let result = self.call_value(&callee, &args, &Value::Undefined)?;
                stack.push(result);
            }
            call::NEW_INSTANCE => {
                let arity = operands[0] as usize;
                if stack.len() < arity + 1 {
                    return Err(RuntimeError::StackUnderflow);
                }
                let args = stack.split_off(stack.len() - arity);
                let ctor = pop(stack)?;
                let instance = self.construct(&ctor, &args)?;
                stack.push(instance);
            }
            call::RETURN => {
                return Ok(Flow::Return(pop(stack)?));
            }
            call::CREATE_FUNCTION => {
                let name = pool.name(operands[0])?;
                let params = pool.str_list(operands[1])?;
                let body_src = pool.name(operands[2])?;
                stack.push(Value::Function(Rc::new(FunctionValue {
                    name,
                    params,
                    body_src,
                    scope: scope.clone(),
                })));
            }
            jump::JUMP => {
                return Ok(Flow::Jump(pool.offset(operands[0])?));
            }
            jump::JUMP_IF_TRUE => {
                let cond = pop(stack)?;
                if cond.truthy() {
                    return Ok(Flow::Jump(pool.offset(operands[0])?));
                }
            }
            jump::JUMP_IF_FALSE => {
                let cond = pop(stack)?;
                if !cond.truthy() {
                    return Ok(Flow::Jump(pool.offset(operands[0])?));
                }
            }
            object::CREATE_OBJECT => {
                stack.push(Value::object());
            }
            object::LOAD_PROPERTY => {
                let name = pool.name(operands[0])?;
                let obj = pop(stack)?;
                stack.push(property_of(&obj, &name)?);
            }
            object::STORE_PROPERTY => {
                let name = pool.name(operands[0])?;
                let value = pop(stack)?;
                let obj = pop(stack)?;
                set_property(&obj, &name, value.clone())?;
                stack.push(value);
            }
            object::CREATE_ARRAY => {
                stack.push(Value::array(Vec::new()));
            }
            object::ARRAY_PUSH => {
                let value = pop(stack)?;
                let arr = pop(stack)?;
                match &arr {
                    Value::Array(elems) => elems.borrow_mut().push(value),
                    other => {
                        return Err(RuntimeError::TypeMismatch(format!(
                            "cannot push into a {}",
                            other.type_name()
                        )))
                    }
                }
                stack.push(arr);
            }
            object::LOAD_INDEX => {
                let index = pop(stack)?;
                let obj = pop(stack)?;
                stack.push(index_of(&obj, &index)?);
            }
            object::STORE_INDEX => {
                let value = pop(stack)?;
                let index = pop(stack)?;
                let obj = pop(stack)?;
                set_index(&obj, &index, value.clone())?;
                stack.push(value);
            }
            stk::POP => {
                *completion = pop(stack)?;
            }
            stk::DUPLICATE => {
                let top = stack.last().ok_or(RuntimeError::StackUnderflow)?.clone();
                stack.push(top);
            }
            stk::UNDEFINED => stack.push(Value::Undefined),
            stk::NULL => stack.push(Value::Null),
            stk::THIS => stack.push(this.clone()),
            exc::TRY_BEGIN => {
                let base = opcode_pc as i64 + 1;
                let catch_pc = base + pool.offset(operands[0])? as i64;
                let finally_pc = base + pool.offset(operands[1])? as i64;
                if catch_pc < 0 || finally_pc < 0 {
                    return Err(RuntimeError::TruncatedStream);
                }
                try_blocks.push(TryFrame {
                    catch_pc: catch_pc as usize,
                    finally_pc: finally_pc as usize,
                });
            }
            exc::TRY_END => {
                try_blocks.pop();
            }
            exc::CATCH => {
                let name = pool.name(operands[0])?;
                let exception = stack.last().ok_or(RuntimeError::StackUnderflow)?.clone();
                scope.define(&name, exception);
            }
            exc::THROW => {
                return Err(RuntimeError::Thrown(pop(stack)?));
            }
            special::NOP => {}
            other => return Err(RuntimeError::BadOpcode(other)),
        }
        Ok(Flow::Continue)
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: &[Value],
        this: &Value,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Native(n) => (n.f)(args),
            Value::Function(f) => self.call_function(f, args, this),
            other => Err(RuntimeError::TypeMismatch(format!(
                "value of type {} is not callable",
                other.type_name()
            ))),
        }
    }

    /// Second-stage compile: parse and lower the stored body source, then
    /// dispatch the sub-program in a child of the defining scope.
    fn call_function(
        &mut self,
        f: &Rc<FunctionValue>,
        args: &[Value],
        this: &Value,
    ) -> Result<Value, RuntimeError> {
        if self.depth >= self.max_depth {
            return Err(RuntimeError::CallDepthExceeded);
        }
        let program = parser::parse(&f.body_src)
            .map_err(|e| RuntimeError::DynamicCompile(e.to_string()))?;
        let lowered = lowerer::lower(&program, UnsupportedPolicy::Strict)
            .map_err(|e| RuntimeError::DynamicCompile(e.to_string()))?;

        let child = Scope::child(f.scope.clone());
        for (i, param) in f.params.iter().enumerate() {
            child.define(param, args.get(i).cloned().unwrap_or(Value::Undefined));
        }

        let view = PoolView::new(lowered.pool.entries(), None);
        self.depth += 1;
        let result = self.dispatch(&lowered.code, &view, &child, this, false, None);
        self.depth -= 1;
        result
    }

    fn construct(&mut self, ctor: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        match ctor {
            Value::Function(f) => {
                let instance = Value::object();
                if let Value::Object(data) = &instance {
                    data.borrow_mut().ctor = Some(f.clone());
                }
                let result = self.call_function(f, args, &instance)?;
                Ok(match result {
                    explicit @ (Value::Object(_) | Value::Array(_)) => explicit,
                    _ => instance,
                })
            }
            Value::Native(n) => (n.f)(args),
            other => Err(RuntimeError::TypeMismatch(format!(
                "value of type {} is not a constructor",
                other.type_name()
            ))),
        }
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, RuntimeError> {
    stack.pop().ok_or(RuntimeError::StackUnderflow)
}

fn property_of(obj: &Value, name: &str) -> Result<Value, RuntimeError> {
    Ok(match obj {
        Value::Object(data) => data.borrow().get(name).unwrap_or(Value::Undefined),
        Value::Array(elems) => intrinsics::array_member(elems, name).unwrap_or(Value::Undefined),
        Value::Str(s) => intrinsics::string_member(s, name).unwrap_or(Value::Undefined),
        Value::Function(f) => match name {
            "name" => Value::Str(f.name.clone()),
            "length" => Value::Number(f.params.len() as f64),
            _ => Value::Undefined,
        },
        Value::Native(n) => match name {
            "name" => Value::Str(n.name.to_string()),
            _ => Value::Undefined,
        },
        Value::Number(_) | Value::Bool(_) => Value::Undefined,
        Value::Undefined | Value::Null => {
            return Err(RuntimeError::TypeMismatch(format!(
                "cannot read property `{name}` of {}",
                obj.to_display()
            )))
        }
    })
}

fn set_property(obj: &Value, name: &str, value: Value) -> Result<(), RuntimeError> {
    match obj {
        Value::Object(data) => {
            data.borrow_mut().set(name, value);
            Ok(())
        }
        Value::Array(elems) => {
            if name == "length" {
                let len = value.to_number();
                if len.is_finite() && len >= 0.0 {
                    elems.borrow_mut().resize(len as usize, Value::Undefined);
                    return Ok(());
                }
            }
            Err(RuntimeError::TypeMismatch(format!(
                "cannot set property `{name}` on an array"
            )))
        }
        other => Err(RuntimeError::TypeMismatch(format!(
            "cannot set property `{name}` on a {}",
            other.type_name()
        ))),
    }
}

fn index_of(obj: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let key = index.to_display();
    Ok(match obj {
        Value::Array(elems) => {
            if let Ok(i) = key.parse::<usize>() {
                elems.borrow().get(i).cloned().unwrap_or(Value::Undefined)
            } else {
                intrinsics::array_member(elems, &key).unwrap_or(Value::Undefined)
            }
        }
        Value::Object(data) => data.borrow().get(&key).unwrap_or(Value::Undefined),
        Value::Str(s) => {
            if let Ok(i) = key.parse::<usize>() {
                s.chars()
                    .nth(i)
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or(Value::Undefined)
            } else {
                intrinsics::string_member(s, &key).unwrap_or(Value::Undefined)
            }
        }
        Value::Undefined | Value::Null => {
            return Err(RuntimeError::TypeMismatch(format!(
                "cannot index {} with `{key}`",
                obj.to_display()
            )))
        }
        _ => Value::Undefined,
    })
}

fn set_index(obj: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match obj {
        Value::Array(elems) => {
            let key = index.to_display();
            let i: usize = key.parse().map_err(|_| {
                RuntimeError::TypeMismatch(format!("bad array index `{key}`"))
            })?;
            let mut elems = elems.borrow_mut();
            if i >= elems.len() {
                elems.resize(i + 1, Value::Undefined);
            }
            elems[i] = value;
            Ok(())
        }
        Value::Object(data) => {
            data.borrow_mut().set(&index.to_display(), value);
            Ok(())
        }
        other => Err(RuntimeError::TypeMismatch(format!(
            "cannot index-assign into a {}",
            other.type_name()
        ))),
    }
}
