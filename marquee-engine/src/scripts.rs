//! Server-side scripts for the seat state machine.
//!
//! Every script takes `KEYS[1] = seats:{showtime_id}` (hash: seat_id -> JSON
//! record) and `KEYS[2] = available:{showtime_id}` (integer counter), reads
//! `now` from the store's own clock via `TIME`, and returns a cjson-encoded
//! result. One-script-at-a-time execution is the only concurrency control the
//! engine relies on.
//!
//! Empty Lua tables encode as `{}`, not `[]`, so list fields are omitted when
//! empty; the Rust side deserializes them with `#[serde(default)]`.

pub const BATCH_RESERVE: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local booking_id = ARGV[1]
local duration = tonumber(ARGV[2])
if duration == nil or duration <= 0 then
  return redis.error_reply('INVALID_INPUT non-positive hold duration')
end
local seats = cjson.decode(ARGV[3])
if #seats == 0 then
  return redis.error_reply('INVALID_INPUT empty seat list')
end
local held_until = now + duration

local unavailable = {}
local current = {}
for i, seat in ipairs(seats) do
  local raw = redis.call('HGET', KEYS[1], seat.seat_id)
  if not raw then
    table.insert(unavailable, { seat_id = seat.seat_id, reason = 'not_found' })
  else
    local rec = cjson.decode(raw)
    if rec.status == 'booked' then
      table.insert(unavailable, { seat_id = seat.seat_id, reason = 'booked' })
    elseif rec.status == 'held' and rec.booking_id ~= booking_id
        and tonumber(rec.held_until or 0) > now then
      table.insert(unavailable, { seat_id = seat.seat_id, reason = 'held' })
    else
      current[i] = rec
    end
  end
end
if #unavailable > 0 then
  return cjson.encode({ success = false, unavailable = unavailable })
end

local newly_held = 0
for i, seat in ipairs(seats) do
  local rec = current[i]
  if rec.status == 'available' then
    newly_held = newly_held + 1
  end
  local updated = {
    status = 'held',
    seat_type = rec.seat_type,
    booking_id = booking_id,
    held_until = held_until,
    reserved_at = now,
  }
  redis.call('HSET', KEYS[1], seat.seat_id, cjson.encode(updated))
end
if newly_held > 0 then
  redis.call('DECRBY', KEYS[2], newly_held)
end
return cjson.encode({ success = true, reserved = #seats, expires_at = held_until })
"#;

pub const CONFIRM_SEATS: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local booking_id = ARGV[1]
local seat_ids = cjson.decode(ARGV[2])

local confirmed = {}
local failed = {}
for _, seat_id in ipairs(seat_ids) do
  local raw = redis.call('HGET', KEYS[1], seat_id)
  if not raw then
    table.insert(failed, { seat_id = seat_id, reason = 'not_found' })
  else
    local rec = cjson.decode(raw)
    if rec.status ~= 'held' then
      table.insert(failed, { seat_id = seat_id, reason = 'not_held' })
    elseif rec.booking_id ~= booking_id then
      table.insert(failed, { seat_id = seat_id, reason = 'wrong_booking' })
    elseif tonumber(rec.held_until or 0) <= now then
      table.insert(failed, { seat_id = seat_id, reason = 'hold_expired' })
    else
      local updated = {
        status = 'booked',
        seat_type = rec.seat_type,
        booking_id = booking_id,
        reserved_at = rec.reserved_at,
        confirmed_at = now,
      }
      redis.call('HSET', KEYS[1], seat_id, cjson.encode(updated))
      table.insert(confirmed, seat_id)
    end
  end
end

local result = {}
if #confirmed > 0 then result.confirmed = confirmed end
if #failed > 0 then result.failed = failed end
return cjson.encode(result)
"#;

pub const RELEASE_SEATS: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local booking_id = ARGV[1]
local seat_ids = cjson.decode(ARGV[2])

local released = {}
local failed = {}
for _, seat_id in ipairs(seat_ids) do
  local raw = redis.call('HGET', KEYS[1], seat_id)
  if not raw then
    table.insert(failed, { seat_id = seat_id, reason = 'not_found' })
  else
    local rec = cjson.decode(raw)
    if rec.booking_id ~= booking_id then
      table.insert(failed, { seat_id = seat_id, reason = 'wrong_booking' })
    else
      local updated = {
        status = 'available',
        seat_type = rec.seat_type,
        released_at = now,
        previous_booking = booking_id,
      }
      redis.call('HSET', KEYS[1], seat_id, cjson.encode(updated))
      table.insert(released, seat_id)
    end
  end
end
if #released > 0 then
  redis.call('INCRBY', KEYS[2], #released)
end

local result = { available = tonumber(redis.call('GET', KEYS[2]) or '0') }
if #released > 0 then result.released = released end
if #failed > 0 then result.failed = failed end
return cjson.encode(result)
"#;

pub const CLEANUP_EXPIRED_HOLDS: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local fields = redis.call('HGETALL', KEYS[1])

local released = {}
for i = 1, #fields, 2 do
  local seat_id = fields[i]
  local rec = cjson.decode(fields[i + 1])
  if rec.status == 'held' and tonumber(rec.held_until or 0) <= now then
    local updated = {
      status = 'available',
      seat_type = rec.seat_type,
      released_at = now,
      released_reason = 'HOLD_EXPIRED',
      previous_booking = rec.booking_id,
    }
    redis.call('HSET', KEYS[1], seat_id, cjson.encode(updated))
    table.insert(released, seat_id)
  end
end
if #released > 0 then
  redis.call('INCRBY', KEYS[2], #released)
end

local result = {
  count = #released,
  available = tonumber(redis.call('GET', KEYS[2]) or '0'),
}
if #released > 0 then result.released = released end
return cjson.encode(result)
"#;

/// Read-only in intent, but reaps any expired hold it observes so readers
/// never see a stale `held`.
pub const GET_SEATS_STATUS: &str = r#"
local now = tonumber(redis.call('TIME')[1])

local entries = {}
if ARGV[1] and ARGV[1] ~= '' then
  for _, seat_id in ipairs(cjson.decode(ARGV[1])) do
    local raw = redis.call('HGET', KEYS[1], seat_id)
    if raw then
      table.insert(entries, seat_id)
      table.insert(entries, raw)
    end
  end
else
  entries = redis.call('HGETALL', KEYS[1])
end

local seats = {}
local reaped = 0
for i = 1, #entries, 2 do
  local seat_id = entries[i]
  local rec = cjson.decode(entries[i + 1])
  if rec.status == 'held' and tonumber(rec.held_until or 0) <= now then
    rec = {
      status = 'available',
      seat_type = rec.seat_type,
      released_at = now,
      released_reason = 'HOLD_EXPIRED',
      previous_booking = rec.booking_id,
    }
    redis.call('HSET', KEYS[1], seat_id, cjson.encode(rec))
    reaped = reaped + 1
  end
  rec.seat_id = seat_id
  if rec.status == 'held' then
    rec.remaining_seconds = tonumber(rec.held_until) - now
  end
  table.insert(seats, rec)
end
if reaped > 0 then
  redis.call('INCRBY', KEYS[2], reaped)
end

local result = { available = tonumber(redis.call('GET', KEYS[2]) or '0') }
if #seats > 0 then result.seats = seats end
return cjson.encode(result)
"#;

pub const EXTEND_HOLD: &str = r#"
local now = tonumber(redis.call('TIME')[1])
local booking_id = ARGV[1]
local seat_ids = cjson.decode(ARGV[2])
local additional = tonumber(ARGV[3])
if additional == nil or additional <= 0 then
  return redis.error_reply('INVALID_INPUT non-positive extension')
end

local extended = 0
for _, seat_id in ipairs(seat_ids) do
  local raw = redis.call('HGET', KEYS[1], seat_id)
  if raw then
    local rec = cjson.decode(raw)
    if rec.status == 'held' and rec.booking_id == booking_id
        and tonumber(rec.held_until or 0) > now then
      rec.held_until = tonumber(rec.held_until) + additional
      redis.call('HSET', KEYS[1], seat_id, cjson.encode(rec))
      extended = extended + 1
    end
  end
end
return cjson.encode({ extended = extended })
"#;

/// Script name -> text, in load order.
pub const ALL: &[(&str, &str)] = &[
    ("batch_reserve", BATCH_RESERVE),
    ("confirm_seats", CONFIRM_SEATS),
    ("release_seats", RELEASE_SEATS),
    ("cleanup_expired_holds", CLEANUP_EXPIRED_HOLDS),
    ("get_seats_status", GET_SEATS_STATUS),
    ("extend_hold", EXTEND_HOLD),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_script_is_registered_once() {
        let mut names: Vec<&str> = ALL.iter().map(|(name, _)| *name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn scripts_take_time_from_the_store() {
        for (name, text) in ALL {
            assert!(
                text.contains("redis.call('TIME')"),
                "{} must read the store clock",
                name
            );
        }
    }

    #[test]
    fn mutating_scripts_guard_on_booking_id() {
        for name in ["confirm_seats", "release_seats", "extend_hold"] {
            let (_, text) = ALL.iter().find(|(n, _)| *n == name).unwrap();
            assert!(text.contains("booking_id"), "{} must match booking_id", name);
        }
    }
}
