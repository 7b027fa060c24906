//! One method per remote verb.
//!
//! Keys, values and arguments are raw bytes on the wire; methods accept
//! anything that is `AsRef<[u8]>` and hand back owned byte vectors. Turning
//! those into structured values is the job of [`crate::codec`].
use std::io::{Read, Write};

use log::{debug, warn};

use crate::TyrantError;

use super::{ExtOptions, MiscOptions, Opcode, Request, SearchRequest, Session};

/// Scale of the fractional part in `adddouble` requests and replies.
const FRACTION_SCALE: f64 = 1e12;

impl<S: Read + Write> Session<S> {
    /// Stores `value` under `key`, replacing any existing record.
    pub fn put<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(), TyrantError> {
        self.execute(key_value(Opcode::Put, key.as_ref(), value.as_ref()))?;
        Ok(())
    }

    /// Stores `value` only if `key` is absent.
    pub fn putkeep<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(), TyrantError> {
        self.execute(key_value(Opcode::PutKeep, key.as_ref(), value.as_ref()))?;
        Ok(())
    }

    /// Appends `value` to the record, creating it if needed.
    pub fn putcat<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(), TyrantError> {
        self.execute(key_value(Opcode::PutCat, key.as_ref(), value.as_ref()))?;
        Ok(())
    }

    /// Appends `value`, then keeps only the trailing `width` bytes.
    pub fn putshl<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &mut self,
        key: K,
        value: V,
        width: u32,
    ) -> Result<(), TyrantError> {
        let (key, value) = (key.as_ref(), value.as_ref());
        let request = Request::new(Opcode::PutShl)
            .length(key)
            .length(value)
            .u32(width)
            .raw(key)
            .raw(value);
        self.execute(request)?;
        Ok(())
    }

    /// Stores without waiting for any reply.
    pub fn putnr<K: AsRef<[u8]>, V: AsRef<[u8]>>(
        &mut self,
        key: K,
        value: V,
    ) -> Result<(), TyrantError> {
        self.execute(key_value(Opcode::PutNr, key.as_ref(), value.as_ref()).without_reply())?;
        Ok(())
    }

    pub fn out<K: AsRef<[u8]>>(&mut self, key: K) -> Result<(), TyrantError> {
        self.execute(key_only(Opcode::Out, key.as_ref()).absent_on_failure())?;
        Ok(())
    }

    pub fn get<K: AsRef<[u8]>>(&mut self, key: K) -> Result<Vec<u8>, TyrantError> {
        let transport = self.execute(key_only(Opcode::Get, key.as_ref()).absent_on_failure())?;
        Ok(transport.read_sized()?)
    }

    /// Fetches several records in one round-trip. Missing keys are simply
    /// absent from the reply.
    pub fn mget<K: AsRef<[u8]>>(
        &mut self,
        keys: &[K],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TyrantError> {
        let mut request = Request::new(Opcode::MGet).u32(count(keys.len())?);
        for key in keys {
            request = request.sized(key.as_ref());
        }

        let transport = self.execute(request)?;
        let found = transport.read_u32()? as usize;
        if found > keys.len() {
            return Err(TyrantError::Malformed(format!(
                "mget returned {found} records for {} keys",
                keys.len()
            )));
        }
        let mut pairs = Vec::with_capacity(found);
        for _ in 0..found {
            pairs.push(transport.read_pair()?);
        }
        debug!("mget: {} of {} keys found", pairs.len(), keys.len());
        Ok(pairs)
    }

    /// Size of the stored value in bytes. Fails with
    /// [`TyrantError::NotFound`] when the key is absent.
    pub fn vsiz<K: AsRef<[u8]>>(&mut self, key: K) -> Result<u32, TyrantError> {
        let transport = self.execute(key_only(Opcode::Vsiz, key.as_ref()).absent_on_failure())?;
        Ok(transport.read_u32()?)
    }

    /// Opens the session's key cursor.
    pub fn iterinit(&mut self) -> Result<(), TyrantError> {
        self.execute(Request::new(Opcode::IterInit))?;
        Ok(())
    }

    /// Advances the key cursor; [`TyrantError::NotFound`] once it is exhausted.
    pub fn iternext(&mut self) -> Result<Vec<u8>, TyrantError> {
        let transport = self.execute(Request::new(Opcode::IterNext).absent_on_failure())?;
        Ok(transport.read_sized()?)
    }

    /// Keys starting with `prefix`; `None` means no upper bound.
    pub fn fwmkeys<P: AsRef<[u8]>>(
        &mut self,
        prefix: P,
        max: Option<u32>,
    ) -> Result<Vec<Vec<u8>>, TyrantError> {
        let prefix = prefix.as_ref();
        let max = match max {
            Some(max) => i32::try_from(max).unwrap_or(i32::MAX),
            None => -1,
        };
        let request = Request::new(Opcode::FwmKeys)
            .length(prefix)
            .i32(max)
            .raw(prefix);

        let transport = self.execute(request)?;
        Ok(transport.read_list()?)
    }

    /// Adds `num` to the integer record and returns the new total.
    pub fn addint<K: AsRef<[u8]>>(&mut self, key: K, num: i32) -> Result<i32, TyrantError> {
        let key = key.as_ref();
        let request = Request::new(Opcode::AddInt).length(key).i32(num).raw(key);
        let transport = self.execute(request)?;
        Ok(transport.read_i32()?)
    }

    /// Adds `num` to the floating point record and returns the new total.
    pub fn adddouble<K: AsRef<[u8]>>(&mut self, key: K, num: f64) -> Result<f64, TyrantError> {
        let key = key.as_ref();
        let integral = num.trunc();
        let fraction = ((num - integral) * FRACTION_SCALE).round();
        let request = Request::new(Opcode::AddDouble)
            .length(key)
            .i64(integral as i64)
            .i64(fraction as i64)
            .raw(key);

        let transport = self.execute(request)?;
        let integral = transport.read_i64()?;
        let fraction = transport.read_i64()?;
        Ok(integral as f64 + fraction as f64 / FRACTION_SCALE)
    }

    /// Calls the server-side function `name` with `key` and `value`.
    pub fn ext<N, K, V>(
        &mut self,
        name: N,
        opts: ExtOptions,
        key: K,
        value: V,
    ) -> Result<Vec<u8>, TyrantError>
    where
        N: AsRef<[u8]>,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let (name, key, value) = (name.as_ref(), key.as_ref(), value.as_ref());
        let request = Request::new(Opcode::Ext)
            .length(name)
            .u32(opts.bits())
            .length(key)
            .length(value)
            .raw(name)
            .raw(key)
            .raw(value);

        let transport = self.execute(request)?;
        Ok(transport.read_sized()?)
    }

    /// Forces the server to persist pending updates.
    pub fn sync(&mut self) -> Result<(), TyrantError> {
        self.execute(Request::new(Opcode::Sync))?;
        Ok(())
    }

    /// Rebuilds the database file; `params` are flavor specific tuning options.
    pub fn optimize<P: AsRef<[u8]>>(&mut self, params: P) -> Result<(), TyrantError> {
        self.execute(key_only(Opcode::Optimize, params.as_ref()))?;
        Ok(())
    }

    /// Removes every record.
    pub fn vanish(&mut self) -> Result<(), TyrantError> {
        self.execute(Request::new(Opcode::Vanish))?;
        Ok(())
    }

    /// Hot-copies the database file to `path` on the server host.
    pub fn copy<P: AsRef<[u8]>>(&mut self, path: P) -> Result<(), TyrantError> {
        self.execute(key_only(Opcode::Copy, path.as_ref()))?;
        Ok(())
    }

    /// Number of records.
    pub fn rnum(&mut self) -> Result<u64, TyrantError> {
        let transport = self.execute(Request::new(Opcode::Rnum))?;
        Ok(transport.read_u64()?)
    }

    /// Database size in bytes.
    pub fn size(&mut self) -> Result<u64, TyrantError> {
        let transport = self.execute(Request::new(Opcode::Size))?;
        Ok(transport.read_u64()?)
    }

    /// Server status as `key<TAB>value` lines; see [`crate::status::Stats`].
    pub fn stat(&mut self) -> Result<String, TyrantError> {
        let transport = self.execute(Request::new(Opcode::Stat))?;
        let raw = transport.read_sized()?;
        String::from_utf8(raw).map_err(|e| TyrantError::Malformed(format!("stat: {e}")))
    }

    /// Generic batched call (`putlist`, `outlist`, `getlist`, `search`, ...).
    pub fn misc<N, A>(
        &mut self,
        name: N,
        args: &[A],
        opts: MiscOptions,
    ) -> Result<Vec<Vec<u8>>, TyrantError>
    where
        N: AsRef<[u8]>,
        A: AsRef<[u8]>,
    {
        let name = name.as_ref();
        let mut request = Request::new(Opcode::Misc)
            .length(name)
            .u32(opts.bits())
            .u32(count(args.len())?)
            .raw(name);
        for arg in args {
            request = request.sized(arg.as_ref());
        }

        let transport = self.execute(request)?;
        Ok(transport.read_list()?)
    }

    /// Stores every `(key, value)` pair in one call.
    pub fn putlist<K, V>(&mut self, pairs: &[(K, V)], opts: MiscOptions) -> Result<(), TyrantError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let args: Vec<&[u8]> = pairs
            .iter()
            .flat_map(|(k, v)| [k.as_ref(), v.as_ref()])
            .collect();
        self.misc("putlist", &args, opts)?;
        Ok(())
    }

    pub fn outlist<K: AsRef<[u8]>>(
        &mut self,
        keys: &[K],
        opts: MiscOptions,
    ) -> Result<(), TyrantError> {
        self.misc("outlist", keys, opts)?;
        Ok(())
    }

    /// Batched fetch through `misc("getlist")`.
    ///
    /// Older servers reply with a flat list of values, newer ones with
    /// interleaved keys and values. The shape is told apart by comparing the
    /// reply length to the number of requested keys: a longer reply, or one
    /// whose even positions are exactly requested keys, is interleaved; a reply
    /// of the same length otherwise pairs values with keys by position.
    pub fn getlist<K: AsRef<[u8]>>(
        &mut self,
        keys: &[K],
        opts: MiscOptions,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, TyrantError> {
        let reply = self.misc("getlist", keys, opts)?;

        if reply.len() > keys.len() || is_interleaved(keys, &reply) {
            if reply.len() % 2 != 0 {
                return Err(TyrantError::Malformed(format!(
                    "getlist returned {} elements for an interleaved key/value reply",
                    reply.len()
                )));
            }
            let mut pairs = Vec::with_capacity(reply.len() / 2);
            let mut elements = reply.into_iter();
            while let (Some(key), Some(value)) = (elements.next(), elements.next()) {
                pairs.push((key, value));
            }
            return Ok(pairs);
        }

        if reply.len() < keys.len() {
            return Err(TyrantError::Malformed(format!(
                "getlist returned {} values for {} keys; cannot tell which are missing",
                reply.len(),
                keys.len()
            )));
        }

        warn!("getlist returned a flat value list; pairing values with keys by position");
        Ok(keys
            .iter()
            .map(|k| k.as_ref().to_vec())
            .zip(reply)
            .collect())
    }

    /// Runs a table search. The meaning of the returned elements depends on
    /// [`SearchRequest::mode`] and the requested columns.
    pub fn search(&mut self, request: &SearchRequest) -> Result<Vec<Vec<u8>>, TyrantError> {
        debug!(
            "search: {} conditions, mode {:?}, {} metasearch branches",
            request.conditions.len(),
            request.mode,
            request
                .metasearch
                .as_ref()
                .map_or(0, |(_, branches)| branches.len())
        );
        self.misc("search", &request.args(), MiscOptions::empty())
    }
}

fn key_only(opcode: Opcode, key: &[u8]) -> Request {
    Request::new(opcode).length(key).raw(key)
}

fn key_value(opcode: Opcode, key: &[u8], value: &[u8]) -> Request {
    Request::new(opcode)
        .length(key)
        .length(value)
        .raw(key)
        .raw(value)
}

fn count(len: usize) -> Result<u32, TyrantError> {
    u32::try_from(len)
        .map_err(|_| TyrantError::Value(format!("{len} elements exceed a single request")))
}

fn is_interleaved<K: AsRef<[u8]>>(keys: &[K], reply: &[Vec<u8>]) -> bool {
    if reply.is_empty() || reply.len() % 2 != 0 {
        return false;
    }
    let mut requested = keys.iter().map(AsRef::as_ref);
    reply
        .iter()
        .step_by(2)
        .all(|returned| requested.any(|k| k == returned.as_slice()))
}
