//! Arrays: homogeneous element sequences.
//!
//! Length comes from `initial_length`, or the array keeps reading until
//! `read_until` holds (evaluated after each element with `index`, `element`
//! and `array` bound) or, with `read_until: eof`, until the input ends.

use crate::ast::Param;
use crate::env::{Operand, Overrides};
use crate::error::{BinDataError, Result};
use crate::params::{Nested, SanitizedField};
use crate::stream::{ByteReader, ByteWriter};
use crate::tree::{truth, ObjectId, State, Tree};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

impl Tree {
    fn element_decl(&self, id: ObjectId) -> Result<Arc<SanitizedField>> {
        match self.nested(id)? {
            Nested::Element(decl) => Ok(decl),
            _ => Err(self.unsupported(id, "element")),
        }
    }

    /// Elements, materializing `initial_length` of them on first use.
    pub(crate) fn array_elements(&mut self, id: ObjectId) -> Result<Vec<ObjectId>> {
        if let State::Array(Some(elements)) = &self.node(id)?.state {
            return Ok(elements.clone());
        }
        self.set_elements(id, Vec::new())?;
        let n = self.eval_len(id, "initial_length")?.unwrap_or(0);
        for _ in 0..n {
            self.push_element(id)?;
        }
        self.current_elements(id)
    }

    fn current_elements(&self, id: ObjectId) -> Result<Vec<ObjectId>> {
        match &self.node(id)?.state {
            State::Array(Some(elements)) => Ok(elements.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn set_elements(&mut self, id: ObjectId, elements: Vec<ObjectId>) -> Result<()> {
        self.node_mut(id)?.state = State::Array(Some(elements));
        Ok(())
    }

    fn push_element(&mut self, id: ObjectId) -> Result<ObjectId> {
        let decl = self.element_decl(id)?;
        let index = self.current_elements(id)?.len();
        let mut locals = BTreeMap::new();
        locals.insert("index".to_string(), Value::Int(index as i128));
        let element = self.instantiate(&decl, Some(id), locals)?;
        match &mut self.node_mut(id)?.state {
            State::Array(Some(elements)) => elements.push(element),
            state => *state = State::Array(Some(vec![element])),
        }
        Ok(element)
    }

    pub(crate) fn array_element(&mut self, id: ObjectId, index: usize) -> Result<ObjectId> {
        let elements = self.array_elements(id)?;
        if let Some(element) = elements.get(index) {
            return Ok(*element);
        }
        let mut element = self.push_element(id)?;
        while self.current_elements(id)?.len() <= index {
            element = self.push_element(id)?;
        }
        Ok(element)
    }

    pub(crate) fn read_array(&mut self, id: ObjectId, reader: &mut dyn ByteReader) -> Result<()> {
        self.set_elements(id, Vec::new())?;
        match self.param(id, "read_until")? {
            Some(Param::Symbol(s)) if s == "eof" => {
                while !reader.is_eof()? {
                    let before = reader.offset();
                    let element = self.push_element(id)?;
                    self.read(element, reader)?;
                    if reader.offset() == before {
                        return Err(BinDataError::Argument(format!(
                            "{}: read_until eof with an element that consumed no input",
                            self.debug_name(element)?
                        )));
                    }
                }
            }
            Some(condition) => loop {
                let element = self.push_element(id)?;
                self.read(element, reader)?;
                let index = self.current_elements(id)?.len() - 1;
                let overrides = Overrides::none()
                    .with("index", Operand::Value(Value::Int(index as i128)))
                    .with("element", Operand::Object(element))
                    .with("array", Operand::Object(id));
                let done = self.evaluate(id, &condition, &overrides)?;
                if truth(&done, "read_until")? {
                    break;
                }
            },
            None => {
                let n = self.eval_len(id, "initial_length")?.unwrap_or(0);
                for _ in 0..n {
                    let element = self.push_element(id)?;
                    self.read(element, reader)?;
                }
            }
        }
        log::debug!("{}: read {} elements", self.debug_name(id)?, self.current_elements(id)?.len());
        Ok(())
    }

    pub(crate) fn write_array(&mut self, id: ObjectId, writer: &mut dyn ByteWriter) -> Result<()> {
        for element in self.array_elements(id)? {
            self.write(element, writer)?;
        }
        Ok(())
    }

    pub(crate) fn array_num_bytes(&mut self, id: ObjectId) -> Result<u64> {
        let mut total = 0;
        for element in self.array_elements(id)? {
            total += self.num_bytes(element)?;
        }
        Ok(total)
    }

    pub(crate) fn array_value(&mut self, id: ObjectId) -> Result<Value> {
        let mut items = Vec::new();
        for element in self.array_elements(id)? {
            if let Some(v) = self.snapshot(element)? {
                items.push(v);
            }
        }
        Ok(Value::List(items))
    }

    /// Replace all elements with one per list item.
    pub(crate) fn assign_array(&mut self, id: ObjectId, value: Value) -> Result<()> {
        let items = match value {
            Value::List(items) => items,
            other => {
                return Err(BinDataError::Argument(format!(
                    "{}: cannot assign a {} value to an array",
                    self.debug_name(id)?,
                    other.kind_name()
                )))
            }
        };
        self.clear_array(id)?;
        self.set_elements(id, Vec::new())?;
        for item in items {
            let element = self.push_element(id)?;
            self.assign(element, item)?;
        }
        Ok(())
    }

    pub(crate) fn clear_array(&mut self, id: ObjectId) -> Result<()> {
        let elements = match &mut self.node_mut(id)?.state {
            State::Array(elements) => elements.take().unwrap_or_default(),
            _ => Vec::new(),
        };
        for element in elements {
            self.release(element)?;
        }
        Ok(())
    }

    pub(crate) fn array_is_clear(&mut self, id: ObjectId) -> Result<bool> {
        for element in self.current_elements(id)? {
            if !self.is_clear(element)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn array_offset_of(&mut self, id: ObjectId, child: ObjectId) -> Result<u64> {
        let mut offset = 0;
        for element in self.array_elements(id)? {
            if element == child {
                return Ok(offset);
            }
            offset += self.num_bytes(element)?;
        }
        Err(BinDataError::NoSuchName {
            name: self.debug_name(child)?,
            context: self.debug_name(id)?,
        })
    }
}
