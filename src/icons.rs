//! Icon catalogue.
//!
//! Names imported from the icon module that are not in this catalogue are
//! rebound to [`FALLBACK_ICON`] instead of failing the build.

use std::collections::HashSet;

pub const ICON_MODULE: &str = "lucide-react";
pub const FALLBACK_ICON: &str = "HelpCircle";

lazy_static::lazy_static! {
    pub static ref KNOWN_ICONS: HashSet<&'static str> = [
        // Arrows & navigation
        "ArrowDown", "ArrowDownLeft", "ArrowDownRight", "ArrowLeft", "ArrowRight", "ArrowUp",
        "ArrowUpLeft", "ArrowUpRight", "ArrowUpDown", "ArrowLeftRight", "ChevronDown",
        "ChevronLeft", "ChevronRight", "ChevronUp", "ChevronsDown", "ChevronsLeft",
        "ChevronsRight", "ChevronsUp", "ChevronsUpDown", "CornerDownLeft", "CornerDownRight",
        "MoveRight", "MoveLeft", "Undo", "Undo2", "Redo", "Redo2", "RotateCcw", "RotateCw",
        "RefreshCw", "RefreshCcw", "Repeat", "Shuffle", "ExternalLink", "Link", "Link2",
        "Navigation", "Compass", "Map", "MapPin", "Locate", "LocateFixed",
        // Actions
        "Check", "CheckCircle", "CheckCircle2", "CheckSquare", "X", "XCircle", "XSquare",
        "Plus", "PlusCircle", "PlusSquare", "Minus", "MinusCircle", "Edit", "Edit2", "Edit3",
        "Pencil", "PenTool", "Trash", "Trash2", "Copy", "Clipboard", "ClipboardCheck",
        "ClipboardList", "Save", "Download", "Upload", "Share", "Share2", "Send", "Search",
        "ZoomIn", "ZoomOut", "Filter", "SlidersHorizontal", "Sliders", "Settings", "Settings2",
        "Cog", "Wrench", "LogIn", "LogOut", "Power", "Play", "Pause", "Square", "Circle",
        "StopCircle", "PlayCircle", "PauseCircle", "SkipBack", "SkipForward", "FastForward",
        "Rewind", "Maximize", "Maximize2", "Minimize", "Minimize2", "Expand", "Shrink",
        "Move", "Grip", "GripVertical", "GripHorizontal", "MoreHorizontal", "MoreVertical",
        "Menu", "Eye", "EyeOff", "Lock", "Unlock", "Key", "Scissors", "Printer",
        // Status & feedback
        "AlertCircle", "AlertTriangle", "AlertOctagon", "Info", "HelpCircle", "Bell",
        "BellOff", "BellRing", "Loader", "Loader2", "Ban", "ShieldCheck", "Shield",
        "ShieldAlert", "ThumbsUp", "ThumbsDown", "Star", "Heart", "Award", "Trophy", "Flag",
        "Bookmark", "Tag", "Tags", "Zap", "Flame", "Sparkles", "Sparkle", "Target", "Crown",
        // Files & content
        "File", "FileText", "FileCode", "FileImage", "FilePlus", "FileMinus", "Files",
        "Folder", "FolderOpen", "FolderPlus", "Archive", "Book", "BookOpen", "Library",
        "Newspaper", "Image", "ImagePlus", "Camera", "Video", "Film", "Music", "Mic",
        "MicOff", "Headphones", "Volume", "Volume1", "Volume2", "VolumeX", "Paperclip",
        "Code", "Code2", "Terminal", "Database", "Server", "HardDrive", "Cpu", "Layers",
        "Layout", "LayoutDashboard", "LayoutGrid", "LayoutList", "List", "ListOrdered",
        "ListChecks", "Grid", "Table", "Columns", "Rows", "Kanban", "Type", "Bold", "Italic",
        "Underline", "AlignLeft", "AlignCenter", "AlignRight", "AlignJustify", "Quote",
        "Hash", "AtSign", "Percent", "Calculator",
        // People & communication
        "User", "UserPlus", "UserMinus", "UserCheck", "UserX", "Users", "UserCircle",
        "Contact", "Mail", "MailOpen", "Inbox", "MessageCircle", "MessageSquare", "Phone",
        "PhoneCall", "PhoneOff", "Smile", "Frown", "Meh", "Bot", "Brain",
        // Commerce & data
        "ShoppingCart", "ShoppingBag", "CreditCard", "DollarSign", "Euro", "Wallet",
        "Receipt", "Package", "Package2", "Truck", "Gift", "Store", "BarChart", "BarChart2",
        "BarChart3", "LineChart", "PieChart", "AreaChart", "TrendingUp", "TrendingDown",
        "Activity", "Gauge",
        // Time & weather
        "Calendar", "CalendarDays", "CalendarCheck", "Clock", "Timer", "Hourglass",
        "AlarmClock", "History", "Sun", "Moon", "Cloud", "CloudRain", "CloudSnow",
        "CloudLightning", "Wind", "Droplet", "Droplets", "Thermometer", "Umbrella",
        "Sunrise", "Sunset",
        // Devices & places
        "Home", "Building", "Building2", "Briefcase", "Monitor", "Laptop", "Smartphone",
        "Tablet", "Tv", "Watch", "Wifi", "WifiOff", "Bluetooth", "Battery", "BatteryCharging",
        "Plug", "Lightbulb", "Rocket", "Plane", "Car", "Bike", "Train", "Ship", "Anchor",
        "Globe", "Globe2", "Mountain", "Trees", "Leaf", "Flower", "Coffee", "Pizza",
        "Utensils", "Gamepad", "Gamepad2", "Dice1", "Dice5", "Puzzle", "Palette", "Brush",
        "Paintbrush", "Wand", "Wand2", "Feather", "Github", "Twitter", "Linkedin",
        "Facebook", "Instagram", "Youtube", "Chrome", "Figma", "Slack", "Twitch",
    ]
    .into_iter()
    .collect();
}

/// Whether `name` is an export of the icon module.
///
/// Besides the bare catalogue names, the icon module also exports every icon
/// with an `Icon` suffix and a `Lucide` prefix.
pub fn is_known_icon(name: &str) -> bool {
    if KNOWN_ICONS.contains(name) {
        return true;
    }
    if let Some(base) = name.strip_suffix("Icon") {
        if KNOWN_ICONS.contains(base) {
            return true;
        }
    }
    if let Some(base) = name.strip_prefix("Lucide") {
        if KNOWN_ICONS.contains(base) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_icons() {
        assert!(is_known_icon("Check"));
        assert!(is_known_icon("CheckIcon"));
        assert!(is_known_icon("LucideCheck"));
        assert!(is_known_icon(FALLBACK_ICON));
        assert!(!is_known_icon("SparkleUnicorn"));
        assert!(!is_known_icon("Icon"));
    }
}
