//! SMILES parsing into an atom/bond graph.
//!
//! Covers the organic subset, bracket atoms (isotope, chirality marks,
//! explicit hydrogens, charge, atom class), branches, ring closures
//! (including `%nn`), explicit bond symbols and dot-disconnected
//! components. Stereo marks are accepted and discarded.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Largest ring enumerated for aromaticity perception and ring counts.
pub const MAX_RING_SIZE: usize = 7;

/// Errors returned by the SMILES parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty structure")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("unknown element: {0}")]
    UnknownElement(String),

    #[error("unclosed bracket atom at position {0}")]
    UnclosedBracket(usize),

    #[error("unmatched parenthesis at position {0}")]
    UnmatchedParen(usize),

    #[error("ring closure {0} never closed")]
    UnclosedRing(u16),

    #[error("conflicting or invalid ring bond {0}")]
    InvalidRingBond(u16),

    #[error("bond symbol without a following atom at position {0}")]
    DanglingBond(usize),

    #[error("valence exceeded for {symbol} at atom {atom}")]
    Valence { symbol: &'static str, atom: usize },

    #[error("aromatic atom {0} is not in a ring")]
    AromaticOutsideRing(usize),
}

/// Static data for one chemical element.
#[derive(Debug, PartialEq)]
pub struct ElementInfo {
    pub symbol: &'static str,
    pub number: u8,
    /// Standard atomic weight
    pub mass: f64,
    /// Allowed valences for implicit-hydrogen atoms; empty for bracket-only elements
    pub valences: &'static [u8],
}

macro_rules! element {
    ($sym:expr, $num:expr, $mass:expr) => {
        ElementInfo { symbol: $sym, number: $num, mass: $mass, valences: &[] }
    };
    ($sym:expr, $num:expr, $mass:expr, $val:expr) => {
        ElementInfo { symbol: $sym, number: $num, mass: $mass, valences: $val }
    };
}

static ELEMENTS: &[ElementInfo] = &[
    element!("H", 1, 1.008),
    element!("He", 2, 4.0026),
    element!("Li", 3, 6.94),
    element!("Be", 4, 9.0122),
    element!("B", 5, 10.81, &[3]),
    element!("C", 6, 12.011, &[4]),
    element!("N", 7, 14.007, &[3, 5]),
    element!("O", 8, 15.999, &[2]),
    element!("F", 9, 18.998, &[1]),
    element!("Ne", 10, 20.180),
    element!("Na", 11, 22.990),
    element!("Mg", 12, 24.305),
    element!("Al", 13, 26.982),
    element!("Si", 14, 28.085),
    element!("P", 15, 30.974, &[3, 5]),
    element!("S", 16, 32.06, &[2, 4, 6]),
    element!("Cl", 17, 35.45, &[1]),
    element!("Ar", 18, 39.948),
    element!("K", 19, 39.098),
    element!("Ca", 20, 40.078),
    element!("Ti", 22, 47.867),
    element!("Cr", 24, 51.996),
    element!("Mn", 25, 54.938),
    element!("Fe", 26, 55.845),
    element!("Co", 27, 58.933),
    element!("Ni", 28, 58.693),
    element!("Cu", 29, 63.546),
    element!("Zn", 30, 65.38),
    element!("Ga", 31, 69.723),
    element!("Ge", 32, 72.630),
    element!("As", 33, 74.922),
    element!("Se", 34, 78.971),
    element!("Br", 35, 79.904, &[1]),
    element!("Kr", 36, 83.798),
    element!("Rb", 37, 85.468),
    element!("Sr", 38, 87.62),
    element!("Ag", 47, 107.87),
    element!("Cd", 48, 112.41),
    element!("Sn", 50, 118.71),
    element!("Sb", 51, 121.76),
    element!("Te", 52, 127.60),
    element!("I", 53, 126.90, &[1]),
    element!("Xe", 54, 131.29),
    element!("Cs", 55, 132.91),
    element!("Ba", 56, 137.33),
    element!("Pt", 78, 195.08),
    element!("Au", 79, 196.97),
    element!("Hg", 80, 200.59),
    element!("Tl", 81, 204.38),
    element!("Pb", 82, 207.2),
    element!("Bi", 83, 208.98),
    element!("U", 92, 238.03),
];

/// Look up an element by its symbol (case-sensitive).
pub fn element(symbol: &str) -> Option<&'static ElementInfo> {
    ELEMENTS.iter().find(|e| e.symbol == symbol)
}

/// Look up an element by atomic number.
pub fn element_by_number(number: u8) -> Option<&'static ElementInfo> {
    ELEMENTS.iter().find(|e| e.number == number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to an atom's valence (aromatic counts as one).
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub element: &'static ElementInfo,
    pub aromatic: bool,
    pub charge: i8,
    /// Total attached hydrogens (explicit for bracket atoms, implicit otherwise)
    pub hydrogens: u8,
    pub isotope: Option<u16>,
    pub bracket: bool,
}

impl Atom {
    pub fn symbol(&self) -> &'static str {
        self.element.symbol
    }

    pub fn is(&self, symbol: &str) -> bool {
        self.element.symbol == symbol
    }
}

#[derive(Debug, Clone)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
    pub in_ring: bool,
    implicit: bool,
}

impl Bond {
    /// The atom on the other end, if `atom` is one end of this bond.
    pub fn other(&self, atom: usize) -> Option<usize> {
        if self.a == atom {
            Some(self.b)
        } else if self.b == atom {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Parsed molecular graph.
#[derive(Debug, Clone)]
pub struct Molecule {
    source: String,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Per atom: (neighbor, bond index)
    adjacency: Vec<Vec<(usize, usize)>>,
    /// Simple cycles up to [`MAX_RING_SIZE`] atoms
    rings: Vec<Vec<usize>>,
}

impl Molecule {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Small rings as ordered atom cycles.
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    pub fn atom(&self, idx: usize) -> &Atom {
        &self.atoms[idx]
    }

    pub fn bond(&self, idx: usize) -> &Bond {
        &self.bonds[idx]
    }

    /// Neighbors of `atom` as (neighbor index, bond index).
    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    /// Number of explicit (graph) neighbors.
    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<&Bond> {
        self.adjacency[a]
            .iter()
            .find(|(n, _)| *n == b)
            .map(|(_, bond)| &self.bonds[*bond])
    }

    pub fn in_ring(&self, atom: usize) -> bool {
        self.adjacency[atom]
            .iter()
            .any(|(_, bond)| self.bonds[*bond].in_ring)
    }

    /// Count of connected components.
    pub fn component_count(&self) -> usize {
        let mut seen = vec![false; self.atoms.len()];
        let mut count = 0;
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            count += 1;
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            while let Some(cur) = queue.pop_front() {
                for &(n, _) in &self.adjacency[cur] {
                    if !seen[n] {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
        }
        count
    }

    /// True when `a` and `b` stay connected after removing bond `skip`.
    fn connected_without(&self, a: usize, b: usize, skip: usize) -> bool {
        let mut seen = vec![false; self.atoms.len()];
        let mut queue = VecDeque::from([a]);
        seen[a] = true;
        while let Some(cur) = queue.pop_front() {
            if cur == b {
                return true;
            }
            for &(n, bond) in &self.adjacency[cur] {
                if bond != skip && !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }
        false
    }
}

/// Parse a SMILES string into a [`Molecule`].
pub fn parse_smiles(input: &str) -> Result<Molecule, SmilesError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SmilesError::Empty);
    }
    let mut parser = Parser::new(input);
    parser.run()?;
    parser.finish(input)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    prev: Option<usize>,
    branches: Vec<(usize, Option<usize>)>,
    pending: Option<(BondOrder, usize)>,
    rings: HashMap<u16, (usize, Option<BondOrder>)>,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            prev: None,
            branches: Vec::new(),
            pending: None,
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn unexpected(&self) -> SmilesError {
        match self.peek() {
            Some(ch) => SmilesError::UnexpectedChar { ch, pos: self.pos },
            None => SmilesError::DanglingBond(self.pos),
        }
    }

    fn run(&mut self) -> Result<(), SmilesError> {
        while let Some(c) = self.peek() {
            match c {
                '(' => {
                    let prev = self.prev.ok_or_else(|| self.unexpected())?;
                    if self.pending.is_some() {
                        return Err(self.unexpected());
                    }
                    self.branches.push((self.pos, Some(prev)));
                    self.pos += 1;
                }
                ')' => {
                    if let Some((_, pos)) = self.pending {
                        return Err(SmilesError::DanglingBond(pos));
                    }
                    let (_, prev) = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnmatchedParen(self.pos))?;
                    self.prev = prev;
                    self.pos += 1;
                }
                '.' => {
                    if let Some((_, pos)) = self.pending {
                        return Err(SmilesError::DanglingBond(pos));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.pending.is_some() || self.prev.is_none() {
                        return Err(self.unexpected());
                    }
                    let order = match c {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending = Some((order, self.pos));
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.ring_closure()?,
                '[' => {
                    let atom = self.bracket_atom()?;
                    self.add_atom(atom);
                }
                _ if c.is_ascii_alphabetic() => {
                    let atom = self.organic_atom()?;
                    self.add_atom(atom);
                }
                _ => return Err(self.unexpected()),
            }
        }
        Ok(())
    }

    fn add_atom(&mut self, atom: Atom) {
        let idx = self.atoms.len();
        let aromatic = atom.aromatic;
        self.atoms.push(atom);
        if let Some(prev) = self.prev {
            let (order, implicit) = match self.pending.take() {
                Some((order, _)) => (order, false),
                None if aromatic && self.atoms[prev].aromatic => (BondOrder::Aromatic, true),
                None => (BondOrder::Single, true),
            };
            self.push_bond(prev, idx, order, implicit);
        }
        self.prev = Some(idx);
    }

    fn push_bond(&mut self, a: usize, b: usize, order: BondOrder, implicit: bool) {
        self.bonds.push(Bond { a, b, order, in_ring: false, implicit });
    }

    fn ring_closure(&mut self) -> Result<(), SmilesError> {
        let prev = self.prev.ok_or_else(|| self.unexpected())?;
        let number = if self.peek() == Some('%') {
            let digits: String = [self.peek_at(1), self.peek_at(2)]
                .iter()
                .flatten()
                .filter(|c| c.is_ascii_digit())
                .collect();
            if digits.len() != 2 {
                return Err(self.unexpected());
            }
            self.pos += 3;
            digits.parse::<u16>().map_err(|_| self.unexpected())?
        } else {
            let digit = self.peek().and_then(|c| c.to_digit(10)).unwrap_or_default();
            self.pos += 1;
            digit as u16
        };
        let here = self.pending.take().map(|(order, _)| order);

        match self.rings.remove(&number) {
            Some((open, there)) => {
                if open == prev || self.bonds.iter().any(|b| b.other(open) == Some(prev)) {
                    return Err(SmilesError::InvalidRingBond(number));
                }
                let (order, implicit) = match (there, here) {
                    (Some(x), Some(y)) if x != y => return Err(SmilesError::InvalidRingBond(number)),
                    (Some(x), _) | (None, Some(x)) => (x, false),
                    (None, None) if self.atoms[open].aromatic && self.atoms[prev].aromatic => {
                        (BondOrder::Aromatic, true)
                    }
                    (None, None) => (BondOrder::Single, true),
                };
                self.push_bond(open, prev, order, implicit);
            }
            None => {
                self.rings.insert(number, (prev, here));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let c = self.peek().ok_or_else(|| self.unexpected())?;
        let (symbol, aromatic, len) = match (c, self.peek_at(1)) {
            ('C', Some('l')) => ("Cl", false, 2),
            ('B', Some('r')) => ("Br", false, 2),
            ('B', _) => ("B", false, 1),
            ('C', _) => ("C", false, 1),
            ('N', _) => ("N", false, 1),
            ('O', _) => ("O", false, 1),
            ('P', _) => ("P", false, 1),
            ('S', _) => ("S", false, 1),
            ('F', _) => ("F", false, 1),
            ('I', _) => ("I", false, 1),
            ('b', _) => ("B", true, 1),
            ('c', _) => ("C", true, 1),
            ('n', _) => ("N", true, 1),
            ('o', _) => ("O", true, 1),
            ('p', _) => ("P", true, 1),
            ('s', _) => ("S", true, 1),
            _ => return Err(self.unexpected()),
        };
        let element = element(symbol).ok_or_else(|| SmilesError::UnknownElement(symbol.into()))?;
        self.pos += len;
        Ok(Atom {
            element,
            aromatic,
            charge: 0,
            hydrogens: 0,
            isotope: None,
            bracket: false,
        })
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let open = self.pos;
        let close = self.chars[open..]
            .iter()
            .position(|&c| c == ']')
            .map(|offset| open + offset)
            .ok_or(SmilesError::UnclosedBracket(open))?;
        let body: Vec<char> = self.chars[open + 1..close].to_vec();
        self.pos = close + 1;

        let mut i = 0;
        let take_digits = |i: &mut usize| -> Option<u16> {
            let start = *i;
            while *i < body.len() && body[*i].is_ascii_digit() {
                *i += 1;
            }
            body[start..*i].iter().collect::<String>().parse().ok()
        };

        let isotope = take_digits(&mut i);

        let bad = |i: usize| SmilesError::UnexpectedChar {
            ch: body.get(i).copied().unwrap_or(']'),
            pos: open + 1 + i,
        };

        let first = *body.get(i).ok_or_else(|| bad(i))?;
        let (symbol, aromatic) = if first.is_ascii_lowercase() {
            let two: String = body[i..].iter().take(2).collect();
            if two == "se" || two == "as" {
                i += 2;
                (capitalize(&two), true)
            } else if matches!(first, 'b' | 'c' | 'n' | 'o' | 'p' | 's') {
                i += 1;
                (first.to_ascii_uppercase().to_string(), true)
            } else {
                return Err(bad(i));
            }
        } else if first.is_ascii_uppercase() {
            let two: String = body[i..].iter().take(2).collect();
            if two.len() == 2
                && two.chars().nth(1).is_some_and(|c| c.is_ascii_lowercase())
                && element(&two).is_some()
            {
                i += 2;
                (two, false)
            } else {
                i += 1;
                (first.to_string(), false)
            }
        } else {
            return Err(bad(i));
        };
        let element = element(&symbol).ok_or(SmilesError::UnknownElement(symbol))?;

        while body.get(i) == Some(&'@') {
            i += 1;
        }

        let mut hydrogens = 0u8;
        if body.get(i) == Some(&'H') {
            i += 1;
            hydrogens = take_digits(&mut i).map(|n| n as u8).unwrap_or(1);
        }

        let mut charge: i8 = 0;
        if let Some(&sign) = body.get(i).filter(|c| **c == '+' || **c == '-') {
            let unit: i8 = if sign == '+' { 1 } else { -1 };
            i += 1;
            if let Some(n) = take_digits(&mut i) {
                charge = unit * n as i8;
            } else {
                charge = unit;
                while body.get(i) == Some(&sign) {
                    charge += unit;
                    i += 1;
                }
            }
        }

        if body.get(i) == Some(&':') {
            i += 1;
            take_digits(&mut i).ok_or_else(|| bad(i))?;
        }

        if i != body.len() {
            return Err(bad(i));
        }

        Ok(Atom {
            element,
            aromatic,
            charge,
            hydrogens,
            isotope,
            bracket: true,
        })
    }

    fn finish(self, source: &str) -> Result<Molecule, SmilesError> {
        if let Some((_, pos)) = self.pending {
            return Err(SmilesError::DanglingBond(pos));
        }
        if let Some((pos, _)) = self.branches.last() {
            return Err(SmilesError::UnmatchedParen(*pos));
        }
        if let Some(number) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(*number));
        }
        if self.atoms.is_empty() {
            return Err(SmilesError::Empty);
        }

        let mut adjacency = vec![Vec::new(); self.atoms.len()];
        for (idx, bond) in self.bonds.iter().enumerate() {
            adjacency[bond.a].push((bond.b, idx));
            adjacency[bond.b].push((bond.a, idx));
        }

        let mut mol = Molecule {
            source: source.to_string(),
            atoms: self.atoms,
            bonds: self.bonds,
            adjacency,
            rings: Vec::new(),
        };

        for idx in 0..mol.bonds.len() {
            let (a, b) = (mol.bonds[idx].a, mol.bonds[idx].b);
            mol.bonds[idx].in_ring = mol.connected_without(a, b, idx);
        }

        // Implicit aromatic bonds between separate ring systems are single bonds
        for bond in mol.bonds.iter_mut() {
            if bond.implicit && bond.order == BondOrder::Aromatic && !bond.in_ring {
                bond.order = BondOrder::Single;
            }
        }

        for idx in 0..mol.atoms.len() {
            if mol.atoms[idx].aromatic && !mol.in_ring(idx) {
                return Err(SmilesError::AromaticOutsideRing(idx));
            }
            if mol.atoms[idx].bracket {
                continue;
            }
            let bond_sum: u8 = mol.adjacency[idx]
                .iter()
                .map(|(_, b)| mol.bonds[*b].order.valence())
                .sum();
            let atom = &mol.atoms[idx];
            let hydrogens = implicit_hydrogens(atom.element, atom.aromatic, bond_sum).ok_or(
                SmilesError::Valence {
                    symbol: atom.element.symbol,
                    atom: idx,
                },
            )?;
            mol.atoms[idx].hydrogens = hydrogens;
        }

        mol.rings = find_small_rings(&mol);
        perceive_aromaticity(&mut mol);
        Ok(mol)
    }
}

fn find_small_rings(mol: &Molecule) -> Vec<Vec<usize>> {
    let mut rings = Vec::new();
    for start in 0..mol.atoms.len() {
        if mol.in_ring(start) {
            let mut path = vec![start];
            extend_ring(mol, start, &mut path, &mut rings);
        }
    }
    rings
}

/// Depth-first cycle search; each cycle is reported once, rooted at its
/// lowest atom index.
fn extend_ring(mol: &Molecule, start: usize, path: &mut Vec<usize>, rings: &mut Vec<Vec<usize>>) {
    let Some(&last) = path.last() else {
        return;
    };
    for &(next, bond) in &mol.adjacency[last] {
        if !mol.bonds[bond].in_ring {
            continue;
        }
        if next == start && path.len() >= 3 {
            if path[1] < path[path.len() - 1] {
                rings.push(path.clone());
            }
            continue;
        }
        if next <= start || path.contains(&next) || path.len() >= MAX_RING_SIZE {
            continue;
        }
        path.push(next);
        extend_ring(mol, start, path, rings);
        path.pop();
    }
}

/// Mark five- and six-membered rings with six pi electrons as aromatic.
/// Repeats until stable so fused Kekulé systems are picked up ring by ring.
fn perceive_aromaticity(mol: &mut Molecule) {
    let candidates: Vec<Vec<usize>> = mol
        .rings
        .iter()
        .filter(|r| r.len() == 5 || r.len() == 6)
        .cloned()
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for ring in &candidates {
            let ring_bonds: Vec<usize> = (0..ring.len())
                .filter_map(|i| {
                    let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
                    mol.adjacency[a].iter().find(|(n, _)| *n == b).map(|(_, bond)| *bond)
                })
                .collect();
            if ring_bonds.iter().all(|b| mol.bonds[*b].order == BondOrder::Aromatic) {
                continue;
            }
            if pi_electrons(mol, ring) != Some(6) {
                continue;
            }
            for &atom in ring {
                mol.atoms[atom].aromatic = true;
            }
            for bond in ring_bonds {
                mol.bonds[bond].order = BondOrder::Aromatic;
            }
            changed = true;
        }
    }
}

fn pi_electrons(mol: &Molecule, ring: &[usize]) -> Option<u8> {
    let mut total = 0u8;
    for (pos, &idx) in ring.iter().enumerate() {
        let atom = &mol.atoms[idx];
        let prev = ring[(pos + ring.len() - 1) % ring.len()];
        let next = ring[(pos + 1) % ring.len()];
        let in_ring = |n: usize| n == prev || n == next;

        let mut ring_double = false;
        let mut exo_double = None;
        for &(n, bond) in &mol.adjacency[idx] {
            match mol.bonds[bond].order {
                BondOrder::Double if in_ring(n) => ring_double = true,
                BondOrder::Double => exo_double = Some(n),
                BondOrder::Triple => return None,
                _ => {}
            }
        }

        let lone_pair_donor = atom.charge == 0
            && match atom.element.symbol {
                "N" | "P" => mol.degree(idx) + atom.hydrogens as usize == 3,
                "O" | "S" | "Se" => mol.degree(idx) == 2,
                _ => false,
            };

        let electrons = match atom.element.symbol {
            "C" | "N" | "O" | "S" | "P" | "Se" => {
                if ring_double {
                    1
                } else if atom.aromatic {
                    if lone_pair_donor {
                        2
                    } else {
                        1
                    }
                } else if let Some(partner) = exo_double {
                    let partner = mol.atoms[partner].element.symbol;
                    if atom.is("C") && matches!(partner, "O" | "N" | "S") {
                        0
                    } else {
                        return None;
                    }
                } else if atom.is("C") && atom.charge == -1 {
                    2
                } else if lone_pair_donor {
                    2
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        total += electrons;
    }
    Some(total)
}

/// Implicit hydrogen count for an organic-subset atom.
///
/// Aromatic atoms reserve one valence for the delocalized system when their
/// lowest valence allows it.
fn implicit_hydrogens(element: &ElementInfo, aromatic: bool, bond_sum: u8) -> Option<u8> {
    if aromatic {
        let base = *element.valences.first()?;
        if bond_sum + 1 <= base {
            return Some(base - bond_sum - 1);
        }
        if bond_sum <= base {
            return Some(0);
        }
    }
    element
        .valences
        .iter()
        .find(|v| **v >= bond_sum)
        .map(|v| v - bond_sum)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hydrogens(smiles: &str) -> Vec<u8> {
        parse_smiles(smiles)
            .unwrap()
            .atoms()
            .iter()
            .map(|a| a.hydrogens)
            .collect()
    }

    #[test]
    fn test_simple_chain() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.atoms().len(), 3);
        assert_eq!(mol.bonds().len(), 2);
        assert_eq!(hydrogens("CCO"), vec![3, 2, 1]);
    }

    #[test]
    fn test_benzene_is_aromatic_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert!(mol.bonds().iter().all(|b| b.order == BondOrder::Aromatic && b.in_ring));
        assert_eq!(hydrogens("c1ccccc1"), vec![1; 6]);
    }

    #[test]
    fn test_pyridine_and_pyrrole() {
        assert_eq!(hydrogens("c1ccncc1")[3], 0);
        assert_eq!(hydrogens("c1cc[nH]c1")[3], 1);
        assert_eq!(hydrogens("Cn1cccc1")[1], 0);
        assert_eq!(hydrogens("c1ccoc1")[3], 0);
    }

    #[test]
    fn test_branches_and_double_bonds() {
        // Aspirin
        let mol = parse_smiles("CC(=O)OC1=CC=CC=C1C(=O)O").unwrap();
        assert_eq!(mol.atoms().len(), 13);
        // Ring double bonds are perceived as aromatic; the two carbonyls stay double
        let count = |order| mol.bonds().iter().filter(|b| b.order == order).count();
        assert_eq!(count(BondOrder::Double), 2);
        assert_eq!(count(BondOrder::Aromatic), 6);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse_smiles("C[N+](=O)[O-]").unwrap();
        assert_eq!(mol.atom(1).charge, 1);
        assert_eq!(mol.atom(3).charge, -1);
        assert_eq!(mol.atom(3).hydrogens, 0);

        let ammonium = parse_smiles("[NH4+]").unwrap();
        assert_eq!(ammonium.atom(0).hydrogens, 4);

        let mercury = parse_smiles("[Hg]").unwrap();
        assert_eq!(mercury.atom(0).symbol(), "Hg");

        let labelled = parse_smiles("[13CH4]").unwrap();
        assert_eq!(labelled.atom(0).isotope, Some(13));
        assert_eq!(parse_smiles("[Fe+++]").unwrap().atom(0).charge, 3);
    }

    #[test]
    fn test_biphenyl_link_is_single() {
        let mol = parse_smiles("c1ccccc1c1ccccc1").unwrap();
        let link = mol.bond_between(5, 6).unwrap();
        assert_eq!(link.order, BondOrder::Single);
        assert!(!link.in_ring);
    }

    #[test]
    fn test_kekule_rings_become_aromatic() {
        let benzene = parse_smiles("C1=CC=CC=C1").unwrap();
        assert!(benzene.atoms().iter().all(|a| a.aromatic));
        assert!(benzene.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
        assert_eq!(benzene.atom(0).hydrogens, 1);

        let pyrrole = parse_smiles("C1=CNC=C1").unwrap();
        assert!(pyrrole.atom(2).aromatic);

        let naphthalene = parse_smiles("C1=CC=C2C=CC=CC2=C1").unwrap();
        assert!(naphthalene.atoms().iter().all(|a| a.aromatic));

        let cyclohexene = parse_smiles("C1=CCCCC1").unwrap();
        assert!(cyclohexene.atoms().iter().all(|a| !a.aromatic));

        let quinone = parse_smiles("O=C1C=CC(=O)C=C1").unwrap();
        assert!(!quinone.atom(1).aromatic);
    }

    #[test]
    fn test_small_rings() {
        assert_eq!(parse_smiles("C1CCCCC1").unwrap().rings().len(), 1);
        assert_eq!(parse_smiles("c1ccc2ccccc2c1").unwrap().rings().len(), 2);
        assert!(parse_smiles("CCCC").unwrap().rings().is_empty());
    }

    #[test]
    fn test_disconnected_components() {
        let mol = parse_smiles("[Na+].[Cl-]").unwrap();
        assert_eq!(mol.component_count(), 2);
        assert!(mol.bonds().is_empty());
    }

    #[test]
    fn test_percent_ring_closure() {
        let mol = parse_smiles("C%10CCCCC%10").unwrap();
        assert_eq!(mol.bonds().iter().filter(|b| b.in_ring).count(), 6);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(parse_smiles("not a molecule").is_err());
        assert_eq!(parse_smiles("").unwrap_err(), SmilesError::Empty);
        assert!(matches!(parse_smiles("C1CC"), Err(SmilesError::UnclosedRing(1))));
        assert!(matches!(parse_smiles("C(C"), Err(SmilesError::UnmatchedParen(_))));
        assert!(matches!(parse_smiles("CC="), Err(SmilesError::DanglingBond(_))));
        assert!(matches!(parse_smiles("[Xx]"), Err(SmilesError::UnknownElement(_))));
        assert!(matches!(parse_smiles("C(C)(C)(C)(C)C"), Err(SmilesError::Valence { .. })));
        assert!(matches!(parse_smiles("cc"), Err(SmilesError::AromaticOutsideRing(_))));
    }

    #[test]
    fn test_dangling_bond_reports_bond_position() {
        assert_eq!(parse_smiles("C(C=)C").unwrap_err(), SmilesError::DanglingBond(3));
        assert_eq!(parse_smiles("C=.C").unwrap_err(), SmilesError::DanglingBond(1));
        assert_eq!(parse_smiles("CC=").unwrap_err(), SmilesError::DanglingBond(2));
    }
}
