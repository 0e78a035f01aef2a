//! SMARTS substructure patterns.
//!
//! Supported atom primitives: element symbols (aliphatic uppercase, aromatic
//! lowercase), `#n`, `*`, `a`, `A`, `H<n>`, `D<n>`, `R`/`R0`, charges, and
//! recursive `$(...)`. Logical operators `!`, `&` (or implicit), `,` and `;`
//! follow the usual precedence. Bonds: `-`, `=`, `#`, `:`, `~` and the
//! implicit single-or-aromatic bond.

use super::smiles::{element, element_by_number, BondOrder, Molecule};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid SMARTS '{pattern}' at position {pos}: {reason}")]
pub struct SmartsError {
    pub pattern: String,
    pub pos: usize,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
enum AtomPrimitive {
    Any,
    Element { number: u8, aromatic: Option<bool> },
    Aromatic,
    Aliphatic,
    TotalH(u8),
    Degree(u8),
    InRing(bool),
    Charge(i8),
    Recursive(Box<Pattern>),
}

#[derive(Debug, Clone)]
enum AtomExpr {
    Prim(AtomPrimitive),
    Not(Box<AtomExpr>),
    And(Vec<AtomExpr>),
    Or(Vec<AtomExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondExpr {
    Implicit,
    Single,
    Double,
    Triple,
    Aromatic,
    Any,
}

#[derive(Debug, Clone)]
struct PatternBond {
    a: usize,
    b: usize,
    expr: BondExpr,
}

/// A compiled SMARTS pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    atoms: Vec<AtomExpr>,
    bonds: Vec<PatternBond>,
}

impl Pattern {
    /// Compile a SMARTS string.
    pub fn compile(smarts: &str) -> Result<Self, SmartsError> {
        let mut compiler = Compiler {
            source: smarts,
            chars: smarts.chars().collect(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
        };
        compiler.run()?;
        Ok(Pattern {
            source: smarts.to_string(),
            atoms: compiler.atoms,
            bonds: compiler.bonds,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the pattern occurs at least once in `mol`.
    pub fn is_match(&self, mol: &Molecule) -> bool {
        if self.atoms.is_empty() {
            return false;
        }
        let mut mapping = vec![usize::MAX; self.atoms.len()];
        self.extend(mol, 0, &mut mapping)
    }

    /// Number of distinct atom mappings (bounded by `limit`).
    pub fn count_matches(&self, mol: &Molecule, limit: usize) -> usize {
        let mut found = 0;
        if !self.atoms.is_empty() {
            let mut mapping = vec![usize::MAX; self.atoms.len()];
            self.enumerate(mol, 0, &mut mapping, &mut found, limit);
        }
        found
    }

    /// True if the pattern matches with its first atom on `atom`.
    fn matches_at(&self, mol: &Molecule, atom: usize) -> bool {
        if self.atoms.is_empty() || !atom_matches(&self.atoms[0], mol, atom) {
            return false;
        }
        let mut mapping = vec![usize::MAX; self.atoms.len()];
        mapping[0] = atom;
        self.extend(mol, 1, &mut mapping)
    }

    fn candidates(&self, mol: &Molecule, idx: usize, mapping: &[usize]) -> Vec<usize> {
        // Pattern atoms are numbered in parse order, so a bonded earlier atom
        // (if any) is already mapped.
        let anchor = self
            .bonds
            .iter()
            .find_map(|b| match (b.a, b.b) {
                (a, b) if b == idx && a < idx => Some(a),
                (a, b) if a == idx && b < idx => Some(b),
                _ => None,
            });
        match anchor {
            Some(prev) => mol.neighbors(mapping[prev]).iter().map(|(n, _)| *n).collect(),
            None => (0..mol.atoms().len()).collect(),
        }
    }

    fn feasible(&self, mol: &Molecule, idx: usize, candidate: usize, mapping: &[usize]) -> bool {
        if mapping[..idx].contains(&candidate) || !atom_matches(&self.atoms[idx], mol, candidate) {
            return false;
        }
        self.bonds.iter().all(|b| {
            let other = if b.a == idx && b.b < idx {
                b.b
            } else if b.b == idx && b.a < idx {
                b.a
            } else {
                return true;
            };
            mol.bond_between(candidate, mapping[other])
                .is_some_and(|bond| bond_matches(b.expr, bond.order))
        })
    }

    fn extend(&self, mol: &Molecule, idx: usize, mapping: &mut [usize]) -> bool {
        if idx == self.atoms.len() {
            return true;
        }
        for candidate in self.candidates(mol, idx, mapping) {
            if self.feasible(mol, idx, candidate, mapping) {
                mapping[idx] = candidate;
                if self.extend(mol, idx + 1, mapping) {
                    return true;
                }
                mapping[idx] = usize::MAX;
            }
        }
        false
    }

    fn enumerate(
        &self,
        mol: &Molecule,
        idx: usize,
        mapping: &mut [usize],
        found: &mut usize,
        limit: usize,
    ) {
        if *found >= limit {
            return;
        }
        if idx == self.atoms.len() {
            *found += 1;
            return;
        }
        for candidate in self.candidates(mol, idx, mapping) {
            if self.feasible(mol, idx, candidate, mapping) {
                mapping[idx] = candidate;
                self.enumerate(mol, idx + 1, mapping, found, limit);
                mapping[idx] = usize::MAX;
            }
        }
    }
}

fn bond_matches(expr: BondExpr, order: BondOrder) -> bool {
    match expr {
        BondExpr::Implicit => matches!(order, BondOrder::Single | BondOrder::Aromatic),
        BondExpr::Single => order == BondOrder::Single,
        BondExpr::Double => order == BondOrder::Double,
        BondExpr::Triple => order == BondOrder::Triple,
        BondExpr::Aromatic => order == BondOrder::Aromatic,
        BondExpr::Any => true,
    }
}

fn atom_matches(expr: &AtomExpr, mol: &Molecule, idx: usize) -> bool {
    match expr {
        AtomExpr::Prim(p) => primitive_matches(p, mol, idx),
        AtomExpr::Not(inner) => !atom_matches(inner, mol, idx),
        AtomExpr::And(all) => all.iter().all(|e| atom_matches(e, mol, idx)),
        AtomExpr::Or(any) => any.iter().any(|e| atom_matches(e, mol, idx)),
    }
}

fn primitive_matches(prim: &AtomPrimitive, mol: &Molecule, idx: usize) -> bool {
    let atom = mol.atom(idx);
    match prim {
        AtomPrimitive::Any => true,
        AtomPrimitive::Element { number, aromatic } => {
            atom.element.number == *number && aromatic.is_none_or(|ar| ar == atom.aromatic)
        }
        AtomPrimitive::Aromatic => atom.aromatic,
        AtomPrimitive::Aliphatic => !atom.aromatic,
        AtomPrimitive::TotalH(n) => {
            let explicit = mol
                .neighbors(idx)
                .iter()
                .filter(|(n, _)| mol.atom(*n).is("H"))
                .count();
            atom.hydrogens as usize + explicit == *n as usize
        }
        AtomPrimitive::Degree(n) => mol.degree(idx) == *n as usize,
        AtomPrimitive::InRing(ring) => mol.in_ring(idx) == *ring,
        AtomPrimitive::Charge(c) => atom.charge == *c,
        AtomPrimitive::Recursive(pattern) => pattern.matches_at(mol, idx),
    }
}

struct Compiler<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
    atoms: Vec<AtomExpr>,
    bonds: Vec<PatternBond>,
}

impl Compiler<'_> {
    fn error(&self, reason: &'static str) -> SmartsError {
        SmartsError {
            pattern: self.source.to_string(),
            pos: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn run(&mut self) -> Result<(), SmartsError> {
        let mut prev: Option<usize> = None;
        let mut branches: Vec<Option<usize>> = Vec::new();
        let mut pending: Option<BondExpr> = None;
        let mut rings: Vec<(u8, usize, Option<BondExpr>)> = Vec::new();

        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    if prev.is_none() {
                        return Err(self.error("branch without preceding atom"));
                    }
                    branches.push(prev);
                    self.pos += 1;
                }
                ')' => {
                    prev = branches.pop().ok_or_else(|| self.error("unmatched ')'"))?;
                    self.pos += 1;
                }
                '.' => {
                    prev = None;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '~' => {
                    if prev.is_none() || pending.is_some() {
                        return Err(self.error("misplaced bond"));
                    }
                    pending = Some(match c {
                        '-' => BondExpr::Single,
                        '=' => BondExpr::Double,
                        '#' => BondExpr::Triple,
                        ':' => BondExpr::Aromatic,
                        _ => BondExpr::Any,
                    });
                    self.pos += 1;
                }
                '0'..='9' => {
                    let atom = prev.ok_or_else(|| self.error("ring bond without atom"))?;
                    let digit = c.to_digit(10).unwrap_or_default() as u8;
                    self.pos += 1;
                    let here = pending.take();
                    match rings.iter().position(|(d, _, _)| *d == digit) {
                        Some(i) => {
                            let (_, open, there) = rings.remove(i);
                            let expr = here.or(there).unwrap_or(BondExpr::Implicit);
                            self.bonds.push(PatternBond { a: open, b: atom, expr });
                        }
                        None => rings.push((digit, atom, here)),
                    }
                }
                _ => {
                    let expr = if c == '[' {
                        self.bracket()?
                    } else {
                        self.bare_atom()?
                    };
                    let idx = self.atoms.len();
                    self.atoms.push(expr);
                    if let Some(p) = prev {
                        let expr = pending.take().unwrap_or(BondExpr::Implicit);
                        self.bonds.push(PatternBond { a: p, b: idx, expr });
                    }
                    prev = Some(idx);
                }
            }
        }

        if pending.is_some() {
            return Err(self.error("dangling bond"));
        }
        if !branches.is_empty() {
            return Err(self.error("unclosed branch"));
        }
        if !rings.is_empty() {
            return Err(self.error("unclosed ring"));
        }
        if self.atoms.is_empty() {
            return Err(self.error("empty pattern"));
        }
        Ok(())
    }

    fn bare_atom(&mut self) -> Result<AtomExpr, SmartsError> {
        let c = self.peek().ok_or_else(|| self.error("expected atom"))?;
        let next = self.chars.get(self.pos + 1).copied();
        let (prim, len) = match (c, next) {
            ('*', _) => (AtomPrimitive::Any, 1),
            ('a', _) => (AtomPrimitive::Aromatic, 1),
            ('A', _) => (AtomPrimitive::Aliphatic, 1),
            ('C', Some('l')) => (elem("Cl", Some(false)), 2),
            ('B', Some('r')) => (elem("Br", Some(false)), 2),
            ('B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I', _) => {
                (elem(&c.to_string(), Some(false)), 1)
            }
            ('b' | 'c' | 'n' | 'o' | 'p' | 's', _) => {
                (elem(&c.to_ascii_uppercase().to_string(), Some(true)), 1)
            }
            _ => return Err(self.error("unsupported atom")),
        };
        self.pos += len;
        Ok(AtomExpr::Prim(prim))
    }

    fn bracket(&mut self) -> Result<AtomExpr, SmartsError> {
        self.pos += 1;
        let expr = self.low_and()?;
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(expr)
    }

    fn low_and(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.or()?];
        while self.peek() == Some(';') {
            self.pos += 1;
            parts.push(self.or()?);
        }
        Ok(collapse(parts, AtomExpr::And))
    }

    fn or(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.high_and()?];
        while self.peek() == Some(',') {
            self.pos += 1;
            parts.push(self.high_and()?);
        }
        Ok(collapse(parts, AtomExpr::Or))
    }

    fn high_and(&mut self) -> Result<AtomExpr, SmartsError> {
        let mut parts = vec![self.unary()?];
        loop {
            match self.peek() {
                Some('&') => {
                    self.pos += 1;
                    parts.push(self.unary()?);
                }
                Some(']' | ';' | ',') | None => break,
                Some(_) => parts.push(self.unary()?),
            }
        }
        Ok(collapse(parts, AtomExpr::And))
    }

    fn unary(&mut self) -> Result<AtomExpr, SmartsError> {
        if self.peek() == Some('!') {
            self.pos += 1;
            return Ok(AtomExpr::Not(Box::new(self.unary()?)));
        }
        Ok(AtomExpr::Prim(self.primitive()?))
    }

    fn digits(&mut self) -> Option<u8> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect::<String>().parse().ok()
    }

    fn primitive(&mut self) -> Result<AtomPrimitive, SmartsError> {
        let c = self.peek().ok_or_else(|| self.error("unterminated atom"))?;
        match c {
            '*' => {
                self.pos += 1;
                Ok(AtomPrimitive::Any)
            }
            '$' => self.recursive(),
            '#' => {
                self.pos += 1;
                let number = self.digits().ok_or_else(|| self.error("expected atomic number"))?;
                element_by_number(number).ok_or_else(|| self.error("unknown atomic number"))?;
                Ok(AtomPrimitive::Element { number, aromatic: None })
            }
            'H' => {
                self.pos += 1;
                Ok(AtomPrimitive::TotalH(self.digits().unwrap_or(1)))
            }
            'D' => {
                self.pos += 1;
                Ok(AtomPrimitive::Degree(self.digits().unwrap_or(1)))
            }
            'R' => {
                self.pos += 1;
                Ok(AtomPrimitive::InRing(self.digits() != Some(0)))
            }
            '+' | '-' => {
                self.pos += 1;
                let unit: i8 = if c == '+' { 1 } else { -1 };
                if let Some(n) = self.digits() {
                    return Ok(AtomPrimitive::Charge(unit * n as i8));
                }
                let mut charge = unit;
                while self.peek() == Some(c) {
                    self.pos += 1;
                    charge += unit;
                }
                Ok(AtomPrimitive::Charge(charge))
            }
            'a' if !self.lower_follows("as") => {
                self.pos += 1;
                Ok(AtomPrimitive::Aromatic)
            }
            'A' if !self.upper_element_follows() => {
                self.pos += 1;
                Ok(AtomPrimitive::Aliphatic)
            }
            _ if c.is_ascii_lowercase() => {
                for symbol in ["se", "as", "b", "c", "n", "o", "p", "s"] {
                    if self.lower_follows(symbol) {
                        self.pos += symbol.len();
                        let upper = symbol[..1].to_ascii_uppercase() + &symbol[1..];
                        return Ok(elem(&upper, Some(true)));
                    }
                }
                Err(self.error("unknown aromatic symbol"))
            }
            _ if c.is_ascii_uppercase() => {
                let two: String = self.chars[self.pos..].iter().take(2).collect();
                if two.len() == 2
                    && two.chars().nth(1).is_some_and(|c| c.is_ascii_lowercase())
                    && element(&two).is_some()
                {
                    self.pos += 2;
                    return Ok(elem(&two, Some(false)));
                }
                let one = c.to_string();
                if element(&one).is_none() {
                    return Err(self.error("unknown element"));
                }
                self.pos += 1;
                Ok(elem(&one, Some(false)))
            }
            _ => Err(self.error("unexpected character")),
        }
    }

    fn lower_follows(&self, symbol: &str) -> bool {
        let window: String = self.chars[self.pos..].iter().take(symbol.len()).collect();
        window == symbol
    }

    fn upper_element_follows(&self) -> bool {
        let two: String = self.chars[self.pos..].iter().take(2).collect();
        two.len() == 2 && element(&two).is_some()
    }

    fn recursive(&mut self) -> Result<AtomPrimitive, SmartsError> {
        if self.chars.get(self.pos + 1) != Some(&'(') {
            return Err(self.error("expected '(' after '$'"));
        }
        let start = self.pos + 2;
        let mut depth = 1usize;
        let mut end = start;
        while end < self.chars.len() {
            match self.chars[end] {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            end += 1;
        }
        if depth != 0 {
            return Err(self.error("unclosed recursive SMARTS"));
        }
        let inner: String = self.chars[start..end].iter().collect();
        let pattern = Pattern::compile(&inner)?;
        self.pos = end + 1;
        Ok(AtomPrimitive::Recursive(Box::new(pattern)))
    }
}

fn elem(symbol: &str, aromatic: Option<bool>) -> AtomPrimitive {
    let number = element(symbol).map(|e| e.number).unwrap_or_default();
    AtomPrimitive::Element { number, aromatic }
}

fn collapse(mut parts: Vec<AtomExpr>, join: fn(Vec<AtomExpr>) -> AtomExpr) -> AtomExpr {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        join(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::molecule::smiles::parse_smiles;

    fn hit(smarts: &str, smiles: &str) -> bool {
        let pattern = Pattern::compile(smarts).unwrap();
        pattern.is_match(&parse_smiles(smiles).unwrap())
    }

    #[test]
    fn test_element_and_bonds() {
        assert!(hit("C=O", "CC=O"));
        assert!(!hit("C=O", "CCO"));
        assert!(hit("[C]#[C]", "CC#C"));
        assert!(!hit("[C]=[C]", "c1ccccc1"));
        assert!(hit("[C]=[C]", "C=CC"));
    }

    #[test]
    fn test_hydrogen_count_and_charge() {
        assert!(hit("[C](=[O])[OH]", "CC(=O)O"));
        assert!(!hit("[C](=[O])[OH]", "CC(=O)OC"));
        assert!(hit("[N+]([O-])=O", "C[N+](=O)[O-]"));
        assert!(!hit("[N+]([O-])=O", "CN"));
    }

    #[test]
    fn test_or_and_not_and_recursive() {
        assert!(hit("[F,Cl,Br,I][C;!$(C=O)]", "CCCl"));
        assert!(!hit("[F,Cl,Br,I][C;!$(C=O)]", "CC(=O)Cl"));
        assert!(hit("C(=O)Cl", "CC(=O)Cl"));
        assert!(hit("[#7]", "c1ccncc1"));
        assert!(!hit("[N]", "c1ccncc1"));
    }

    #[test]
    fn test_any_bond_and_components() {
        assert!(hit("[O]~[O]", "COOC"));
        assert!(hit("[C]=O.[OH]", "CC(=O)O"));
        assert!(!hit("[C]=O.[OH]", "CC=O"));
    }

    #[test]
    fn test_ring_closure_pattern() {
        assert!(hit("c1ccccc1", "Cc1ccccc1"));
        assert!(!hit("C1CCCCC1", "CCCCCC"));
    }

    #[test]
    fn test_count_matches() {
        let pattern = Pattern::compile("[OH]").unwrap();
        let glycol = parse_smiles("OCCO").unwrap();
        assert_eq!(pattern.count_matches(&glycol, 10), 2);
    }

    #[test]
    fn test_compile_errors() {
        assert!(Pattern::compile("").is_err());
        assert!(Pattern::compile("[C").is_err());
        assert!(Pattern::compile("C(").is_err());
        assert!(Pattern::compile("[Xq]").is_err());
        assert!(Pattern::compile("C1CC").is_err());
    }
}
