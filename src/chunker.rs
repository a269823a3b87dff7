pub(crate) mod polynom;
pub(crate) mod rolling_hash;

use std::io::{self, Read};

use rand::{thread_rng, Rng};

use crate::{
    chunker::{
        polynom::{Polynom, Polynom64},
        rolling_hash::Rabin64,
    },
    error::PolynomialErrorKind,
    CairnResult,
};

pub(super) mod constants {
    /// The average chunk size is 1 MiB: a boundary is drawn where the lowest
    /// 20 bits of the rolling hash are zero.
    pub(super) const SPLITMASK: u64 = (1u64 << 20) - 1;
    pub(super) const KB: usize = 1024;
    pub(super) const MB: usize = 1024 * KB;
    /// Minimal chunk size; also the least scratch buffer size.
    pub(super) const MIN_SIZE: usize = 512 * KB;
    /// Maximal chunk size; chunks are cut here regardless of the hash.
    pub(super) const MAX_SIZE: usize = 8 * MB;
    pub(super) const BUF_SIZE: usize = 64 * KB;
    /// The number of bits of the rolling hash window size (window = 64 bytes)
    pub(super) const WINDOW_SIZE_BITS: u32 = 6;
    pub(super) const RAND_POLY_MAX_TRIES: i32 = 1_000_000;
}

#[inline]
const fn default_predicate(x: u64) -> bool {
    (x & constants::SPLITMASK) == 0
}

/// The `Chunker` wraps the content-defined chunking machinery, parameterized
/// by the repository's chunker polynomial.
///
/// Cloning is cheap compared to re-deriving the rabin tables from the
/// polynomial, so one `Chunker` is kept per archiver and cloned per file.
#[derive(Clone)]
pub(crate) struct Chunker {
    rabin: Rabin64,
}

impl Chunker {
    /// Creates a new `Chunker` for the given polynomial.
    pub(crate) fn new(poly: u64) -> Self {
        Self {
            rabin: Rabin64::new_with_polynom(constants::WINDOW_SIZE_BITS, poly),
        }
    }

    /// Starts chunking the given reader.
    ///
    /// # Arguments
    ///
    /// * `reader` - The byte stream to chunk.
    /// * `size_hint` - An upper bound on the stream length, used to optimize
    ///   memory allocation.
    pub(crate) fn chunk<R: Read>(&self, reader: R, size_hint: usize) -> ChunkIter<R> {
        ChunkIter::new(reader, size_hint, self.rabin.clone())
    }
}

/// A lazy, finite, non-restartable sequence of content-defined chunks.
///
/// The concatenation of all yielded chunks equals the input stream; a read
/// error ends the sequence and is surfaced as the last item.
pub(crate) struct ChunkIter<R: Read> {
    buf: Vec<u8>,
    pos: usize,
    reader: R,
    predicate: fn(u64) -> bool,
    rabin: Rabin64,
    size_hint: usize,
    min_size: usize,
    max_size: usize,
    finished: bool,
}

impl<R: Read> ChunkIter<R> {
    pub(crate) fn new(reader: R, size_hint: usize, rabin: Rabin64) -> Self {
        Self {
            buf: Vec::with_capacity(4 * constants::KB),
            pos: 0,
            reader,
            predicate: default_predicate,
            rabin,
            // size hint is used to optimize memory allocation; this should be
            // an upper bound on the size
            size_hint,
            min_size: constants::MIN_SIZE,
            max_size: constants::MAX_SIZE,
            finished: false,
        }
    }
}

impl<R: Read> Iterator for ChunkIter<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<io::Result<Vec<u8>>> {
        if self.finished {
            return None;
        }

        let mut min_size = self.min_size;
        let mut vec = Vec::with_capacity(self.size_hint.min(min_size));

        // check if some bytes exist in the buffer and if yes, use them
        let open_buf_len = self.buf.len() - self.pos;
        if open_buf_len > 0 {
            vec.resize(open_buf_len, 0);
            vec.copy_from_slice(&self.buf[self.pos..]);
            self.pos = self.buf.len();
            min_size -= open_buf_len;
        }

        // a chunk is never cut below the minimal size, so read that much blindly
        let size = match (&mut self.reader)
            .take(min_size as u64)
            .read_to_end(&mut vec)
        {
            Ok(size) => size,
            Err(err) => return Some(Err(err)),
        };

        // If self.min_size is not reached, we are done.
        // Note that the read data is of size size + open_buf_len and
        // self.min_size = min_size + open_buf_len
        if size < min_size {
            self.finished = true;
            vec.truncate(size + open_buf_len);
            return if vec.is_empty() { None } else { Some(Ok(vec)) };
        }

        // seed the rolling hash with the last window of the minimal chunk
        _ = self
            .rabin
            .reset_and_prefill_window(&mut vec[vec.len() - 64..vec.len()].iter().copied());

        loop {
            if vec.len() >= self.max_size {
                break;
            }

            if (self.predicate)(self.rabin.hash) {
                break;
            }

            if self.buf.len() == self.pos {
                self.buf.resize(constants::BUF_SIZE, 0);
                match self.reader.read(&mut self.buf[..]) {
                    Ok(0) => {
                        self.finished = true;
                        break;
                    }
                    Ok(size) => {
                        self.pos = 0;
                        self.buf.truncate(size);
                    }

                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        return Some(Err(e));
                    }
                }
            }

            let byte = self.buf[self.pos];
            vec.push(byte);
            self.pos += 1;
            self.rabin.slide(byte);
        }
        self.size_hint = self.size_hint.saturating_sub(vec.len());
        Some(Ok(vec))
    }
}

/// [`random_poly`] returns a random irreducible polynomial of degree 53
/// (largest prime number below 64-8)
/// There are (2^53-2/53) irreducible polynomials of degree 53 in
/// `F_2[X]`, c.f. Michael O. Rabin (1981): "Fingerprinting by Random
/// Polynomials", page 4. If no polynomial could be found in one
/// million tries, an error is returned.
pub fn random_poly() -> CairnResult<u64> {
    for _ in 0..constants::RAND_POLY_MAX_TRIES {
        let mut poly: u64 = thread_rng().gen();

        // mask away bits above bit 53
        poly &= (1 << 54) - 1;

        // set highest and lowest bit so that the degree is 53 and the
        // polynomial is not trivially reducible
        poly |= (1 << 53) | 1;

        if poly.irreducible() {
            return Ok(poly);
        }
    }
    Err(PolynomialErrorKind::NoSuitablePolynomialFound.into())
}
