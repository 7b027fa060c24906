//! In-process stand-in for a Tyrant server.
//!
//! [`FakeTyrant`] implements `Read + Write`, so it can be handed straight to
//! `Session::from_stream`. Every flushed request is decoded and answered from
//! an in-memory store; replies are queued for the next reads. Each opcode's
//! round-trips are counted so tests can assert on batching.
#![allow(dead_code)]

use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    io::{self, Cursor, Read, Write},
};

use regex::Regex;

pub const PUT: u8 = 0x10;
pub const PUTKEEP: u8 = 0x11;
pub const PUTCAT: u8 = 0x12;
pub const PUTSHL: u8 = 0x13;
pub const PUTNR: u8 = 0x18;
pub const OUT: u8 = 0x20;
pub const GET: u8 = 0x30;
pub const MGET: u8 = 0x31;
pub const VSIZ: u8 = 0x38;
pub const ITERINIT: u8 = 0x50;
pub const ITERNEXT: u8 = 0x51;
pub const FWMKEYS: u8 = 0x58;
pub const ADDINT: u8 = 0x60;
pub const ADDDOUBLE: u8 = 0x61;
pub const EXT: u8 = 0x68;
pub const SYNC: u8 = 0x70;
pub const OPTIMIZE: u8 = 0x71;
pub const VANISH: u8 = 0x72;
pub const COPY: u8 = 0x73;
pub const RNUM: u8 = 0x80;
pub const SIZE: u8 = 0x81;
pub const STAT: u8 = 0x88;
pub const MISC: u8 = 0x90;

const NEGATE: u32 = 1 << 24;
const NO_INDEX: u32 = 1 << 25;

/// Reply body on failure.
const FAILURE: u8 = 1;

pub struct FakeTyrant {
    db_type: &'static str,
    records: BTreeMap<Vec<u8>, Vec<u8>>,
    counters: BTreeMap<Vec<u8>, i32>,
    doubles: BTreeMap<Vec<u8>, f64>,
    cursor: VecDeque<Vec<u8>>,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    calls: HashMap<u8, usize>,
    misc_calls: Vec<String>,
    /// Answer `getlist` with bare values, the way older servers do.
    pub flat_getlist: bool,
}

impl FakeTyrant {
    pub fn new(db_type: &'static str) -> Self {
        Self {
            db_type,
            records: BTreeMap::new(),
            counters: BTreeMap::new(),
            doubles: BTreeMap::new(),
            cursor: VecDeque::new(),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            calls: HashMap::new(),
            misc_calls: Vec::new(),
            flat_getlist: false,
        }
    }

    pub fn hash() -> Self {
        Self::new("hash")
    }

    pub fn table() -> Self {
        Self::new("table")
    }

    /// The `{a: Foo/1, b: Bar/2, c: Foo/3}` price list.
    pub fn priced() -> Self {
        Self::table()
            .with_record("a", &[("name", "Foo"), ("price", "1")])
            .with_record("b", &[("name", "Bar"), ("price", "2")])
            .with_record("c", &[("name", "Foo"), ("price", "3")])
    }

    pub fn with_record(mut self, key: &str, columns: &[(&str, &str)]) -> Self {
        self.insert_record(key, columns);
        self
    }

    pub fn with_value(mut self, key: &str, value: &[u8]) -> Self {
        self.records.insert(key.as_bytes().to_vec(), value.to_vec());
        self
    }

    pub fn insert_record(&mut self, key: &str, columns: &[(&str, &str)]) {
        let fields: Vec<&[u8]> = columns
            .iter()
            .flat_map(|(c, v)| [c.as_bytes(), v.as_bytes()])
            .collect();
        self.records.insert(key.as_bytes().to_vec(), fields.join(&0u8));
    }

    pub fn record(&self, key: &str) -> Option<&[u8]> {
        self.records.get(key.as_bytes()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Round-trips seen for `opcode`.
    pub fn calls(&self, opcode: u8) -> usize {
        self.calls.get(&opcode).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.values().sum()
    }

    /// Names passed to `misc`, in call order.
    pub fn misc_calls(&self) -> &[String] {
        &self.misc_calls
    }

    pub fn reset_calls(&mut self) {
        self.calls.clear();
        self.misc_calls.clear();
    }

    fn handle(&mut self, request: &[u8]) {
        let mut r = Cursor::new(request);
        assert_eq!(byte(&mut r), 0xc8, "missing magic byte");
        let opcode = byte(&mut r);
        *self.calls.entry(opcode).or_default() += 1;

        match opcode {
            PUT | PUTKEEP | PUTCAT | PUTNR => {
                let (ksiz, vsiz) = (u32(&mut r), u32(&mut r));
                let (key, value) = (bytes(&mut r, ksiz), bytes(&mut r, vsiz));
                match opcode {
                    PUTKEEP if self.records.contains_key(&key) => return self.fail(),
                    PUTCAT => self.records.entry(key).or_default().extend(value),
                    _ => {
                        self.records.insert(key, value);
                    }
                }
                if opcode != PUTNR {
                    self.ok();
                }
            }
            PUTSHL => {
                let (ksiz, vsiz, width) = (u32(&mut r), u32(&mut r), u32(&mut r) as usize);
                let (key, value) = (bytes(&mut r, ksiz), bytes(&mut r, vsiz));
                let stored = self.records.entry(key).or_default();
                stored.extend(value);
                if stored.len() > width {
                    stored.drain(..stored.len() - width);
                }
                self.ok();
            }
            OUT | GET | VSIZ => {
                let ksiz = u32(&mut r);
                let key = bytes(&mut r, ksiz);
                let Some(value) = self.records.get(&key).cloned() else {
                    return self.fail();
                };
                self.ok();
                match opcode {
                    OUT => {
                        self.records.remove(&key);
                    }
                    GET => self.push_sized(&value),
                    _ => self.push_u32(value.len() as u32),
                }
            }
            MGET => {
                let count = u32(&mut r);
                let keys: Vec<Vec<u8>> = (0..count)
                    .map(|_| {
                        let ksiz = u32(&mut r);
                        bytes(&mut r, ksiz)
                    })
                    .collect();
                let found: Vec<(Vec<u8>, Vec<u8>)> = keys
                    .into_iter()
                    .filter_map(|k| self.records.get(&k).cloned().map(|v| (k, v)))
                    .collect();
                self.ok();
                self.push_u32(found.len() as u32);
                for (k, v) in found {
                    self.push_u32(k.len() as u32);
                    self.push_u32(v.len() as u32);
                    self.outbox.extend(k);
                    self.outbox.extend(v);
                }
            }
            ITERINIT => {
                self.cursor = self.records.keys().cloned().collect();
                self.ok();
            }
            ITERNEXT => match self.cursor.pop_front() {
                Some(key) => {
                    self.ok();
                    self.push_sized(&key);
                }
                None => self.fail(),
            },
            FWMKEYS => {
                let psiz = u32(&mut r);
                let max = i32(&mut r);
                let prefix = bytes(&mut r, psiz);
                let limit = if max < 0 { usize::MAX } else { max as usize };
                let keys: Vec<Vec<u8>> = self
                    .records
                    .keys()
                    .filter(|k| k.starts_with(&prefix))
                    .take(limit)
                    .cloned()
                    .collect();
                self.ok();
                self.push_list(&keys);
            }
            ADDINT => {
                let ksiz = u32(&mut r);
                let num = i32(&mut r);
                let key = bytes(&mut r, ksiz);
                let total = self.counters.entry(key).or_default();
                *total += num;
                let total = *total;
                self.ok();
                self.outbox.extend(total.to_be_bytes());
            }
            ADDDOUBLE => {
                let ksiz = u32(&mut r);
                let integral = i64(&mut r);
                let fraction = i64(&mut r);
                let key = bytes(&mut r, ksiz);
                let total = self.doubles.entry(key).or_default();
                *total += integral as f64 + fraction as f64 / 1e12;
                let total = *total;
                self.ok();
                self.outbox.extend((total.trunc() as i64).to_be_bytes());
                self.outbox
                    .extend((((total - total.trunc()) * 1e12).round() as i64).to_be_bytes());
            }
            EXT => {
                let (nsiz, _opts) = (u32(&mut r), u32(&mut r));
                let (ksiz, vsiz) = (u32(&mut r), u32(&mut r));
                let name = bytes(&mut r, nsiz);
                let key = bytes(&mut r, ksiz);
                let value = bytes(&mut r, vsiz);
                match name.as_slice() {
                    b"echo" => {
                        self.ok();
                        let mut out = key;
                        out.push(b':');
                        out.extend(value);
                        self.push_sized(&out);
                    }
                    _ => self.fail(),
                }
            }
            SYNC => self.ok(),
            OPTIMIZE | COPY => {
                let psiz = u32(&mut r);
                let _path = bytes(&mut r, psiz);
                self.ok();
            }
            VANISH => {
                self.records.clear();
                self.ok();
            }
            RNUM => {
                self.ok();
                self.push_u64(self.records.len() as u64);
            }
            SIZE => {
                let size: usize = self.records.iter().map(|(k, v)| k.len() + v.len()).sum();
                self.ok();
                self.push_u64(size as u64);
            }
            STAT => {
                let text = format!(
                    "version\t1.1.41\ntype\t{}\nrnum\t{}\n",
                    self.db_type,
                    self.records.len()
                );
                self.ok();
                self.push_sized(text.as_bytes());
            }
            MISC => {
                let (nsiz, _opts, argc) = (u32(&mut r), u32(&mut r), u32(&mut r));
                let name = String::from_utf8(bytes(&mut r, nsiz)).unwrap();
                let args: Vec<Vec<u8>> = (0..argc)
                    .map(|_| {
                        let size = u32(&mut r);
                        bytes(&mut r, size)
                    })
                    .collect();
                self.misc_calls.push(name.clone());
                match self.misc(&name, args) {
                    Some(list) => {
                        self.ok();
                        self.push_list(&list);
                    }
                    None => self.fail(),
                }
            }
            other => panic!("unexpected opcode {other:#x}"),
        }
    }

    fn misc(&mut self, name: &str, args: Vec<Vec<u8>>) -> Option<Vec<Vec<u8>>> {
        match name {
            "put" => {
                let (key, fields) = args.split_first()?;
                self.records.insert(key.clone(), fields.join(&0u8));
                Some(Vec::new())
            }
            "putlist" => {
                for pair in args.chunks(2) {
                    self.records.insert(pair[0].clone(), pair.get(1).cloned().unwrap_or_default());
                }
                Some(Vec::new())
            }
            "outlist" => {
                for key in &args {
                    self.records.remove(key);
                }
                Some(Vec::new())
            }
            "getlist" => {
                let mut out = Vec::new();
                for key in args {
                    if let Some(value) = self.records.get(&key).cloned() {
                        if !self.flat_getlist {
                            out.push(key);
                        }
                        out.push(value);
                    }
                }
                Some(out)
            }
            "search" => Some(self.search(args)),
            _ => None,
        }
    }

    fn search(&mut self, args: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut branches: Vec<Vec<(String, u32, String)>> = vec![Vec::new()];
        let mut order: Option<(String, u8)> = None;
        let mut limit: Option<(i64, usize)> = None;
        let mut columns: Option<Vec<String>> = None;
        let mut mode = "keys";
        let mut set_operation = 0u8;

        for arg in args {
            let text = String::from_utf8(arg).unwrap();
            let parts: Vec<&str> = text.split('\0').collect();
            match parts[0] {
                "addcond" => branches
                    .last_mut()
                    .unwrap()
                    .push((parts[1].to_string(), parts[2].parse().unwrap(), parts[3].to_string())),
                "setorder" => order = Some((parts[1].to_string(), parts[2].parse().unwrap())),
                "setlimit" => limit = Some((parts[1].parse().unwrap(), parts[2].parse().unwrap())),
                "get" => columns = Some(parts[1..].iter().map(|c| c.to_string()).collect()),
                "count" => mode = "count",
                "hint" => mode = "hint",
                "out" => mode = "out",
                "next" => branches.push(Vec::new()),
                "mstype" => set_operation = parts[1].parse().unwrap(),
                other => panic!("unexpected search directive {other:?}"),
            }
        }

        let mut matched: BTreeSet<Vec<u8>> = self.matching(&branches[0]);
        for branch in &branches[1..] {
            let other = self.matching(branch);
            matched = match set_operation {
                0 => matched.union(&other).cloned().collect(),
                1 => matched.intersection(&other).cloned().collect(),
                _ => matched.difference(&other).cloned().collect(),
            };
        }

        let mut keys: Vec<Vec<u8>> = matched.into_iter().collect();
        if let Some((column, order_type)) = &order {
            keys.sort_by(|a, b| {
                let (va, vb) = (self.column(a, column), self.column(b, column));
                let ordering = match (va, vb) {
                    (Some(va), Some(vb)) if *order_type >= 2 => number(&va)
                        .partial_cmp(&number(&vb))
                        .unwrap_or(Ordering::Equal),
                    (Some(va), Some(vb)) => va.cmp(&vb),
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if order_type % 2 == 1 { ordering.reverse() } else { ordering }
            });
        }
        if let Some((max, skip)) = limit {
            let max = if max < 0 { usize::MAX } else { max as usize };
            keys = keys.into_iter().skip(skip).take(max).collect();
        }

        match mode {
            "count" => vec![keys.len().to_string().into_bytes()],
            "out" => {
                for key in &keys {
                    self.records.remove(key);
                }
                Vec::new()
            }
            "hint" => {
                let mut out = keys;
                out.push(b"\n[[HINT]]\nscanning the whole table\n".to_vec());
                out
            }
            _ => match columns {
                Some(columns) => keys
                    .iter()
                    .map(|key| self.project(key, &columns))
                    .collect(),
                None => keys,
            },
        }
    }

    fn columns_of(&self, key: &[u8]) -> BTreeMap<String, String> {
        let raw = String::from_utf8(self.records.get(key).cloned().unwrap_or_default()).unwrap();
        if raw.is_empty() {
            return BTreeMap::new();
        }
        let parts: Vec<&str> = raw.split('\0').collect();
        parts
            .chunks(2)
            .map(|pair| (pair[0].to_string(), pair.get(1).unwrap_or(&"").to_string()))
            .collect()
    }

    fn column(&self, key: &[u8], column: &str) -> Option<String> {
        if column.is_empty() {
            return Some(String::from_utf8_lossy(key).into_owned());
        }
        self.columns_of(key).remove(column)
    }

    fn project(&self, key: &[u8], columns: &[String]) -> Vec<u8> {
        let mut out = vec![Vec::new(), key.to_vec()];
        for (name, value) in self.columns_of(key) {
            if columns.is_empty() || columns.contains(&name) {
                out.push(name.into_bytes());
                out.push(value.into_bytes());
            }
        }
        out.join(&0u8)
    }

    fn matching(&self, conditions: &[(String, u32, String)]) -> BTreeSet<Vec<u8>> {
        self.records
            .keys()
            .filter(|key| {
                conditions.iter().all(|(column, op, expr)| {
                    let negate = op & NEGATE != 0;
                    let op = op & !(NEGATE | NO_INDEX);
                    let hit = self
                        .column(key, column)
                        .is_some_and(|value| evaluate(op, &value, expr));
                    hit != negate
                })
            })
            .cloned()
            .collect()
    }

    fn ok(&mut self) {
        self.outbox.push_back(0);
    }

    fn fail(&mut self) {
        self.outbox.push_back(FAILURE);
    }

    fn push_u32(&mut self, value: u32) {
        self.outbox.extend(value.to_be_bytes());
    }

    fn push_u64(&mut self, value: u64) {
        self.outbox.extend(value.to_be_bytes());
    }

    fn push_sized(&mut self, bytes: &[u8]) {
        self.push_u32(bytes.len() as u32);
        self.outbox.extend(bytes.iter().copied());
    }

    fn push_list(&mut self, items: &[Vec<u8>]) {
        self.push_u32(items.len() as u32);
        for item in items {
            self.push_sized(item);
        }
    }
}

fn evaluate(op: u32, value: &str, expr: &str) -> bool {
    let tokens: Vec<&str> = expr
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect();
    let lower = value.to_lowercase();
    match op {
        0 => value == expr,
        1 => value.contains(expr),
        2 => value.starts_with(expr),
        3 => value.ends_with(expr),
        4 => tokens.iter().all(|t| value.contains(t)),
        5 => tokens.iter().any(|t| value.contains(t)),
        6 => tokens.iter().any(|t| value == *t),
        7 => Regex::new(expr).unwrap().is_match(value),
        8 => number(value) == number(expr),
        9 => number(value) > number(expr),
        10 => number(value) >= number(expr),
        11 => number(value) < number(expr),
        12 => number(value) <= number(expr),
        13 => {
            let (low, high) = (number(tokens[0]), number(tokens[1]));
            (low..=high).contains(&number(value))
        }
        14 => tokens.iter().any(|t| number(value) == number(t)),
        15 | 18 => lower.contains(&expr.to_lowercase()),
        16 => tokens.iter().all(|t| lower.contains(t)),
        17 => tokens.iter().any(|t| lower.contains(t)),
        other => panic!("unknown condition operator {other}"),
    }
}

fn number(text: &str) -> f64 {
    text.trim().parse().unwrap_or(0.0)
}

fn byte(r: &mut Cursor<&[u8]>) -> u8 {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).unwrap();
    buf[0]
}

fn u32(r: &mut Cursor<&[u8]>) -> u32 {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).unwrap();
    u32::from_be_bytes(buf)
}

fn i32(r: &mut Cursor<&[u8]>) -> i32 {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).unwrap();
    i32::from_be_bytes(buf)
}

fn i64(r: &mut Cursor<&[u8]>) -> i64 {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).unwrap();
    i64::from_be_bytes(buf)
}

fn bytes(r: &mut Cursor<&[u8]>, len: u32) -> Vec<u8> {
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).unwrap();
    buf
}

impl Read for FakeTyrant {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeTyrant {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbox.extend_from_slice(buf);
        Ok(buf.len())
    }

    /// Requests are answered when the client flushes them.
    fn flush(&mut self) -> io::Result<()> {
        let request = std::mem::take(&mut self.inbox);
        if !request.is_empty() {
            self.handle(&request);
        }
        Ok(())
    }
}
