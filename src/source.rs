//! Rastreo de ubicaciones originales en texto fuente.
//!
//! Los distintos objetos internos que el generador construye
//! deben llevar cuenta de posiciones o rangos de ubicaciones en
//! el texto original (programa fuente o archivo de reglas), lo cual
//! permite determinar un punto exacto o aproximado en donde ocurre
//! un error de abstracción arbitraria.

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Range,
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

impl<T: Display> Display for Located<T> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} (at {})", self.value, self.location)
    }
}

impl<T: std::error::Error> std::error::Error for Located<T> {}

/// Una ubicación está conformada por un origen y un rango de posiciones.
///
/// El rango es semiabierto: `end` es la posición inmediatamente
/// posterior al último carácter cubierto.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Construye una ubicación sobre un rango de posiciones.
    pub fn new(from: &Rc<Source>, position: Range<Position>) -> Self {
        Location {
            from: Rc::clone(from),
            position,
        }
    }

    /// Ubicación de un único carácter.
    pub fn point(from: &Rc<Source>, position: Position) -> Self {
        Location::new(from, position..position.advance())
    }

    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Ubicación puntual inmediatamente posterior a esta.
    pub fn after(&self) -> Self {
        Location::point(&self.from, self.position.end)
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end.line != start.line || end.column <= start.column.saturating_add(1) {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición explícita. Ambos ejes comienzan en 1.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Posición que sigue a un carácter dado.
    pub fn after(self, c: char) -> Position {
        match c {
            '\n' => self.newline(),
            _ => self.advance(),
        }
    }

    /// Posición que sigue a un fragmento completo de texto.
    pub fn after_str(self, text: &str) -> Position {
        text.chars().fold(self, Position::after)
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen y texto completo.
///
/// Se conserva el texto para que los diagnósticos puedan citar
/// las líneas involucradas en un error.
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Registra un texto bajo un nombre de origen.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Rc::new(Source {
            name: name.into(),
            text: text.into(),
        })
    }

    /// Nombre del origen, usualmente una ruta.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texto completo.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Invoca `f` con el contenido de una línea, o con `""` si no existe.
    pub fn with_line<F, R>(&self, line: u32, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).saturating_sub(1);
        f(self.text.lines().nth(index).unwrap_or(""))
    }
}

impl Debug for Source {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Source")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_newlines() {
        let end = Position::default().after_str("ab\ncd");
        assert_eq!(end, Position::new(2, 3));
    }

    #[test]
    fn location_display() {
        let source = Source::new("prog.txt", "x = 10 + 20 ;\n");
        let single = Location::point(&source, Position::new(1, 5));
        assert_eq!(single.to_string(), "prog.txt:1:5");

        let range = Location::new(&source, Position::new(1, 5)..Position::new(1, 7));
        assert_eq!(range.to_string(), "prog.txt:[1:5-1:6]");
        assert_eq!(range.after().to_string(), "prog.txt:1:7");
    }

    #[test]
    fn lines_are_retrievable() {
        let source = Source::new("s", "first\nsecond");
        assert_eq!(source.with_line(2, str::to_owned), "second");
        assert_eq!(source.with_line(7, str::len), 0);
    }
}
