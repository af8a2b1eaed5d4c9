// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Waveform dumps of router state.
//!
//! Signals live in a tree of named scopes. Components declare their scope and
//! signals once with [`VcdComponent::vcd_write_scope`]; afterwards every cycle
//! reopens the same scopes and records the values that changed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io;
use std::path;
use std::rc::Rc;

const DEFAULT_VCD_FILE: &str = "fabric.vcd";
pub const DEFAULT_TOP_MODULE: &str = "network";
const VCD_COMMENT: &str = "fabric router trace";

struct Signal {
    id: vcd::IdCode,
    width: u32,
    last: Option<u64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ScopeKind {
    Declaration,
    Trace,
}

/// Closes its scope when dropped.
pub struct VcdScope {
    writer: Rc<RefCell<VcdWriter>>,
    name: String,
    kind: ScopeKind,
}

impl Drop for VcdScope {
    fn drop(&mut self) {
        self.writer.borrow_mut().close_scope(self.kind, &self.name);
    }
}

pub struct VcdWriter {
    writer: vcd::Writer<fs::File>,
    failed: bool,
    scopes: Vec<String>,
    signals: HashMap<String, Signal>,
    timestamp: u64,
}

/// `value` as `width` bits, most significant first.
fn to_bits(width: u32, value: u64) -> Vec<vcd::Value> {
    (0..width)
        .rev()
        .map(|bit| match bit < 64 && (value >> bit) & 1 == 1 {
            true => vcd::Value::V1,
            false => vcd::Value::V0,
        })
        .collect()
}

impl VcdWriter {
    pub fn new(dst: path::PathBuf) -> io::Result<Self> {
        let file = fs::File::create(&dst)?;
        log::debug!("VCD file: {}", dst.display());
        Ok(Self {
            writer: vcd::Writer::new(file),
            failed: false,
            scopes: vec![],
            signals: HashMap::new(),
            timestamp: 0,
        })
    }

    /// Run `op` on the underlying writer unless an earlier write failed.
    /// Only the first failure is reported.
    fn write<F>(&mut self, op: F)
    where
        F: FnOnce(&mut vcd::Writer<fs::File>) -> io::Result<()>,
    {
        if self.failed {
            return;
        }
        if let Err(err) = op(&mut self.writer) {
            self.failed = true;
            log::error!("VCD writing failed with error {:?}", err);
        }
    }

    /// Open a declaration scope, closed when the guard is dropped.
    pub fn managed_decl_scope<T>(writer: Rc<RefCell<VcdWriter>>, name: &T) -> VcdScope
    where
        T: Display + ?Sized,
    {
        Self::open_scope(writer, name.to_string(), ScopeKind::Declaration)
    }

    /// Reopen a declared scope to record changes in it.
    pub fn managed_trace_scope<T>(writer: Rc<RefCell<VcdWriter>>, name: &T) -> VcdScope
    where
        T: Display + ?Sized,
    {
        Self::open_scope(writer, name.to_string(), ScopeKind::Trace)
    }

    fn open_scope(writer: Rc<RefCell<VcdWriter>>, name: String, kind: ScopeKind) -> VcdScope {
        {
            let mut w = writer.borrow_mut();
            if kind == ScopeKind::Declaration {
                w.write(|w| w.add_module(&name));
            }
            w.scopes.push(name.clone());
        }
        VcdScope { writer, name, kind }
    }

    fn close_scope(&mut self, kind: ScopeKind, name: &str) {
        let top = self
            .scopes
            .pop()
            .expect("Closing a VCD scope that was never opened");
        assert_eq!(top, name, "VCD scopes closed out of order");
        if kind == ScopeKind::Declaration {
            self.write(|w| w.upscope());
        }
    }

    fn scoped_name(&self, name: &str) -> String {
        let mut scoped = self.scopes.join(".");
        scoped.push('.');
        scoped.push_str(name);
        scoped
    }

    /// Declare the signals of all `components` and record their values at
    /// time zero.
    pub fn write_header<C: VcdComponent>(writer: Rc<RefCell<Self>>, components: &[C]) {
        {
            let mut w = writer.borrow_mut();
            w.write(|w| w.comment(VCD_COMMENT));
            let date = chrono::Utc::now().to_string();
            w.write(|w| w.date(&date));
        }
        {
            let _top = Self::managed_decl_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
            writer.borrow_mut().add_integer_var("sim_cycles", 64);
            for component in components {
                component.vcd_write_scope(Rc::clone(&writer));
            }
        }
        writer.borrow_mut().write(|w| w.enddefinitions());

        let _top = Self::managed_trace_scope(Rc::clone(&writer), DEFAULT_TOP_MODULE);
        writer.borrow_mut().enter_cycle();
        writer.borrow_mut().change("sim_cycles", 0);
        for component in components {
            component.vcd_init(Rc::clone(&writer));
        }
        writer.borrow_mut().end_cycle();
    }

    /// Declare an integer signal in the current declaration scope.
    pub fn add_integer_var(&mut self, reference: &str, width: u32) {
        let mut id = None;
        self.write(|w| {
            id = Some(w.add_var(vcd::VarType::Integer, width, reference, None)?);
            Ok(())
        });
        if let Some(id) = id {
            let scoped = self.scoped_name(reference);
            let previous = self.signals.insert(
                scoped.clone(),
                Signal {
                    id,
                    width,
                    last: None,
                },
            );
            if previous.is_some() {
                log::warn!("VCD signal {} declared twice", scoped);
            }
        }
    }

    /// Record `value` for `name` in the current trace scope if it changed.
    pub fn change(&mut self, name: &str, value: u64) {
        let scoped = self.scoped_name(name);
        if cfg!(feature = "trace-echo-vcd-signal-changes") {
            log::trace!("VCD {} = {}", scoped, value);
        }
        let (id, bits) = match self.signals.get_mut(&scoped) {
            None => {
                log::warn!("VCD signal {} was never declared", scoped);
                return;
            }
            Some(signal) if signal.last == Some(value) => return,
            Some(signal) => {
                signal.last = Some(value);
                (signal.id, to_bits(signal.width, value))
            }
        };
        self.write(|w| w.change_vector(id, &bits));
    }

    pub fn enter_cycle(&mut self) {
        let timestamp = self.timestamp;
        self.write(|w| w.timestamp(timestamp));
    }

    pub fn end_cycle(&mut self) {
        self.timestamp += 1;
    }

    /// Close the trace with a final timestamp.
    pub fn finish(&mut self) {
        self.enter_cycle();
        self.end_cycle();
    }
}

impl Default for VcdWriter {
    fn default() -> Self {
        let mut path = std::env::temp_dir();
        path.push(DEFAULT_VCD_FILE);
        Self::new(path.clone())
            .unwrap_or_else(|err| panic!("Failed to create VCD file {:?}: {}", path, err))
    }
}

/// Something that declares and records signals in a VCD trace.
pub trait VcdComponent {
    /// Open the component's scope and declare its signals.
    fn vcd_write_scope(&self, vcd_writer: Rc<RefCell<VcdWriter>>);

    /// Record the initial values.
    fn vcd_init(&self, vcd_writer: Rc<RefCell<VcdWriter>>);
}
