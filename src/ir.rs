//! Código de tres direcciones.
//!
//! Cada instrucción tiene a lo sumo un operador, dos operandos y un
//! resultado. El [`Emitter`] mantiene el búfer ordenado de instrucciones
//! y los contadores de temporales y etiquetas de una traducción.
//! [`flow_graph`] presenta el código como grafo de flujo de control.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    rc::Rc,
};

use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Temp(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

impl Display for Temp {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "t{}", self.0)
    }
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "L{}", self.0)
    }
}

/// Operando: un nombre del programa fuente (variable o literal) o un temporal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Name(Rc<str>),
    Temp(Temp),
}

impl From<Temp> for Value {
    fn from(temp: Temp) -> Self {
        Value::Temp(temp)
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Name(name) => fmt.write_str(name),
            Value::Temp(temp) => temp.fmt(fmt),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    SetLabel(Label),
    Jump(Label),
    JumpIf(Value, Label),
    Copy {
        target: Value,
        source: Value,
    },
    Binary {
        target: Temp,
        left: Value,
        op: Rc<str>,
        right: Value,
    },
    Not {
        target: Temp,
        operand: Value,
    },
    Param(Value),
    Call {
        target: Option<Temp>,
        callee: Rc<str>,
        arguments: u32,
    },
}

impl Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match self {
            SetLabel(label) => write!(fmt, "{}:", label),
            Jump(label) => write!(fmt, "goto {}", label),
            JumpIf(value, label) => write!(fmt, "if {} goto {}", value, label),
            Copy { target, source } => write!(fmt, "{} = {}", target, source),

            Binary {
                target,
                left,
                op,
                right,
            } => write!(fmt, "{} = {} {} {}", target, left, op, right),

            Not { target, operand } => write!(fmt, "{} = not {}", target, operand),
            Param(value) => write!(fmt, "param {}", value),

            Call {
                target: Some(target),
                callee,
                arguments,
            } => write!(fmt, "{} = call {}, {}", target, callee, arguments),

            Call {
                target: None,
                callee,
                arguments,
            } => write!(fmt, "call {}, {}", callee, arguments),
        }
    }
}

/// Búfer de instrucciones de una traducción.
///
/// Los nombres de temporales (`t1`, `t2`, ...) y etiquetas (`L1`, `L2`, ...)
/// son únicos dentro de un mismo emisor y arrancan de nuevo en cada uno.
#[derive(Debug, Default)]
pub struct Emitter {
    code: Vec<Instruction>,
    temps: u32,
    labels: u32,
}

impl Emitter {
    pub fn new() -> Self {
        Emitter::default()
    }

    pub fn emit(&mut self, instruction: Instruction) {
        trace!(%instruction, "Emitted");
        self.code.push(instruction);
    }

    /// Inserta una instrucción antes de la que ocupa `index`.
    ///
    /// # Panics
    /// Si `index` excede la longitud del búfer.
    pub fn insert_at(&mut self, index: usize, instruction: Instruction) {
        trace!(%instruction, index, "Inserted");
        self.code.insert(index, instruction);
    }

    pub fn new_temp(&mut self) -> Temp {
        self.temps += 1;
        Temp(self.temps)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels += 1;
        Label(self.labels)
    }

    /// Posición en la que se agregará la siguiente instrucción.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.code
    }
}

/// Grafo de flujo de control en sintaxis Mermaid, un nodo por bloque básico.
///
/// Un bloque comienza al inicio del código, en cada etiqueta y tras cada
/// salto. Los bloques que terminan en un salto condicional se dibujan como
/// decisión, con la arista `Y` hacia el destino y `N` hacia el siguiente.
pub fn flow_graph(code: &[Instruction]) -> String {
    let mut graph = String::from("graph TD\n");
    if code.is_empty() {
        graph.push_str("    empty[\"no code\"]\n");
        return graph;
    }

    let mut leaders = vec![0];
    for (index, instruction) in code.iter().enumerate() {
        match instruction {
            Instruction::SetLabel(_) => leaders.push(index),
            Instruction::Jump(_) | Instruction::JumpIf(..) => leaders.push(index + 1),
            _ => (),
        }
    }

    leaders.retain(|&leader| leader < code.len());
    leaders.sort_unstable();
    leaders.dedup();

    let blocks: Vec<&[Instruction]> = leaders
        .iter()
        .enumerate()
        .map(|(index, &start)| {
            let end = leaders.get(index + 1).copied().unwrap_or(code.len());
            &code[start..end]
        })
        .collect();

    let entries: HashMap<Label, usize> = blocks
        .iter()
        .enumerate()
        .filter_map(|(index, block)| match block.first() {
            Some(Instruction::SetLabel(label)) => Some((*label, index)),
            _ => None,
        })
        .collect();

    for (index, block) in blocks.iter().enumerate() {
        let text: Vec<String> = block
            .iter()
            .map(|instruction| instruction.to_string().replace('"', "'"))
            .collect();

        let text = text.join("<br/>");
        let node = match block.last() {
            Some(Instruction::JumpIf(..)) => format!("    B{}{{\"{}\"}}\n", index, text),
            _ => format!("    B{}[\"{}\"]\n", index, text),
        };

        graph.push_str(&node);
    }

    let mut edge = |from: usize, to: Option<usize>, tag: Option<&str>| {
        if let Some(to) = to {
            match tag {
                Some(tag) => graph.push_str(&format!("    B{} -->|{}| B{}\n", from, tag, to)),
                None => graph.push_str(&format!("    B{} --> B{}\n", from, to)),
            }
        }
    };

    for (index, block) in blocks.iter().enumerate() {
        let next = Some(index + 1).filter(|&next| next < blocks.len());
        match block.last() {
            Some(Instruction::Jump(label)) => edge(index, entries.get(label).copied(), None),

            Some(Instruction::JumpIf(_, label)) => {
                edge(index, entries.get(label).copied(), Some("Y"));
                edge(index, next, Some("N"));
            }

            _ => edge(index, next, None),
        }
    }

    graph
}
